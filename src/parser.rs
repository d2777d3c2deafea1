use pktparse::ethernet::{EtherType, VlanEthernetFrame};
use pktparse::ip::IPProtocol;
use pktparse::ipv4::IPv4Header;
use pktparse::ipv6::IPv6Header;
use pktparse::tcp::TcpHeader;
use pktparse::udp::UdpHeader;
use pktparse::*;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use crate::error::ParseError;

const LINUX_SLL_LEN: usize = 16;
const IPV4_MIN_HEADER_LEN: usize = 20;
/// In 32-bit words.
const TCP_MIN_DATA_OFFSET: u8 = 5;
const UDP_HEADER_LEN: usize = 8;

/// Framing of the bytes handed over by the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// Linux "any" device pseudo header.
    LinuxCooked,
    /// Bare IPv4/IPv6 packet, version taken from the first nibble.
    RawIp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
    Other,
}

#[derive(Debug, Clone)]
pub enum PacketHeader {
    Tcp(TcpHeader),
    Udp(UdpHeader),
    Ipv4(IPv4Header),
    Ipv6(IPv6Header),
    Ethernet(VlanEthernetFrame),
}

impl PacketHeader {
    pub fn name(&self) -> &'static str {
        match self {
            PacketHeader::Ipv4(_) => "Ipv4",
            PacketHeader::Ipv6(_) => "Ipv6",
            PacketHeader::Tcp(_) => "Tcp",
            PacketHeader::Udp(_) => "Udp",
            PacketHeader::Ethernet(_) => "Ether",
        }
    }
}

/// A captured frame with its headers decoded and the transport payload
/// copied out. Decoding of the payload itself is left to the shard that
/// receives the packet.
#[derive(Debug, Clone, Default)]
pub struct ParsedPacket {
    len: u32,
    headers: Vec<PacketHeader>,
    payload: Vec<u8>,
}

impl ParsedPacket {
    pub fn parse(data: &[u8], len: u32, link: LinkLayer) -> Result<ParsedPacket, ParseError> {
        let mut parsed_packet = ParsedPacket {
            len,
            ..ParsedPacket::default()
        };
        match link {
            LinkLayer::Ethernet => parsed_packet.parse_link_layer(data)?,
            LinkLayer::LinuxCooked => parsed_packet.parse_cooked(data)?,
            LinkLayer::RawIp => parsed_packet.parse_raw_ip(data)?,
        }
        Ok(parsed_packet)
    }

    pub fn get_len(&self) -> u32 {
        self.len
    }

    pub fn get_headers(&self) -> &[PacketHeader] {
        &self.headers
    }

    /// Application bytes after the UDP or TCP header; empty when there are none.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn transport(&self) -> Transport {
        self.headers
            .iter()
            .find_map(|h| match h {
                PacketHeader::Udp(_) => Some(Transport::Udp),
                PacketHeader::Tcp(_) => Some(Transport::Tcp),
                _ => None,
            })
            .unwrap_or(Transport::Other)
    }

    /// Source and destination address of the network layer.
    pub fn endpoints(&self) -> Option<(IpAddr, IpAddr)> {
        self.headers.iter().find_map(|h| match h {
            PacketHeader::Ipv4(packet) => Some((
                IpAddr::V4(packet.source_addr),
                IpAddr::V4(packet.dest_addr),
            )),
            PacketHeader::Ipv6(packet) => Some((
                IpAddr::V6(packet.source_addr),
                IpAddr::V6(packet.dest_addr),
            )),
            _ => None,
        })
    }

    pub fn ports(&self) -> Option<(u16, u16)> {
        self.headers.iter().find_map(|h| match h {
            PacketHeader::Tcp(packet) => Some((packet.source_port, packet.dest_port)),
            PacketHeader::Udp(packet) => Some((packet.source_port, packet.dest_port)),
            _ => None,
        })
    }

    /// Hash of the flow that is the same for both directions: the two
    /// `(address, port)` endpoints are ordered before hashing.
    /// `None` when the frame has no network layer.
    pub fn flow_hash(&self) -> Option<u64> {
        let (src_addr, dst_addr) = self.endpoints()?;
        let (src_port, dst_port) = self.ports().unwrap_or((0, 0));
        let a = (src_addr, src_port);
        let b = (dst_addr, dst_port);
        let (low, high) = if a <= b { (a, b) } else { (b, a) };

        let mut hasher = FxHasher::default();
        self.transport().hash(&mut hasher);
        low.hash(&mut hasher);
        high.hash(&mut hasher);
        Some(hasher.finish())
    }

    /// Ethernet, with at most one 802.1Q tag in front of the payload type.
    fn parse_link_layer(&mut self, content: &[u8]) -> Result<(), ParseError> {
        let (payload, frame) = ethernet::parse_vlan_ethernet_frame(content)
            .map_err(|_| ParseError::Truncated("ethernet"))?;
        let result = self.parse_network_layer(frame.ethertype, payload);
        self.headers.push(PacketHeader::Ethernet(frame));
        result
    }

    /// Linux SLL: 16 byte pseudo header, protocol in the last two bytes.
    fn parse_cooked(&mut self, content: &[u8]) -> Result<(), ParseError> {
        if content.len() < LINUX_SLL_LEN {
            return Err(ParseError::Truncated("linux cooked"));
        }
        let protocol = u16::from_be_bytes([content[14], content[15]]);
        self.parse_network_layer(EtherType::from(protocol), &content[LINUX_SLL_LEN..])
    }

    fn parse_raw_ip(&mut self, content: &[u8]) -> Result<(), ParseError> {
        match content.first().map(|b| b >> 4) {
            Some(4) => self.parse_ipv4(content),
            Some(6) => self.parse_ipv6(content),
            _ => Ok(()),
        }
    }

    fn parse_network_layer(&mut self, ethertype: EtherType, content: &[u8]) -> Result<(), ParseError> {
        match ethertype {
            EtherType::IPv4 => self.parse_ipv4(content),
            EtherType::IPv6 => self.parse_ipv6(content),
            _ => Ok(()),
        }
    }

    fn parse_ipv4(&mut self, content: &[u8]) -> Result<(), ParseError> {
        let (_, header) =
            ipv4::parse_ipv4_header(content).map_err(|_| ParseError::Truncated("ipv4"))?;

        let header_len = usize::from(header.ihl) * 4;
        // a zero total length shows up with segmentation offload; trust the capture then
        let end = match usize::from(header.length) {
            0 => content.len(),
            total => total.min(content.len()),
        };
        if header_len < IPV4_MIN_HEADER_LEN || end < header_len {
            return Err(ParseError::Truncated("ipv4"));
        }

        // only the first fragment carries the transport header
        if header.fragment_offset == 0 {
            self.parse_transport_layer(&header.protocol, &content[header_len..end])?;
        }
        self.headers.push(PacketHeader::Ipv4(header));
        Ok(())
    }

    fn parse_ipv6(&mut self, content: &[u8]) -> Result<(), ParseError> {
        let (payload, header) =
            ipv6::parse_ipv6_header(content).map_err(|_| ParseError::Truncated("ipv6"))?;

        let end = match usize::from(header.length) {
            0 => payload.len(),
            length => length.min(payload.len()),
        };
        self.parse_transport_layer(&header.next_header, &payload[..end])?;
        self.headers.push(PacketHeader::Ipv6(header));
        Ok(())
    }

    fn parse_transport_layer(
        &mut self,
        protocol_type: &IPProtocol,
        content: &[u8],
    ) -> Result<(), ParseError> {
        match protocol_type {
            IPProtocol::TCP => self.parse_tcp(content),
            IPProtocol::UDP => self.parse_udp(content),
            _ => Ok(()),
        }
    }

    fn parse_tcp(&mut self, content: &[u8]) -> Result<(), ParseError> {
        let (payload, tcp_header) =
            tcp::parse_tcp_header(content).map_err(|_| ParseError::Truncated("tcp"))?;
        if tcp_header.data_offset < TCP_MIN_DATA_OFFSET {
            return Err(ParseError::Truncated("tcp"));
        }

        self.payload = payload.to_vec();
        self.headers.push(PacketHeader::Tcp(tcp_header));
        Ok(())
    }

    fn parse_udp(&mut self, content: &[u8]) -> Result<(), ParseError> {
        let (payload, udp_header) =
            udp::parse_udp_header(content).map_err(|_| ParseError::Truncated("udp"))?;

        // ethernet padding can trail short datagrams
        let end = match usize::from(udp_header.length).checked_sub(UDP_HEADER_LEN) {
            Some(len) if len <= payload.len() => len,
            _ => payload.len(),
        };
        self.payload = payload[..end].to_vec();
        self.headers.push(PacketHeader::Udp(udp_header));
        Ok(())
    }
}
