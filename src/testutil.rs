//! Hand-built frames and DNS messages for unit tests.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::parser::{LinkLayer, ParsedPacket};

pub const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);
pub const SERVER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const CLIENT6: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x20);
pub const SERVER6: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x1);

pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_CNAME: u16 = 5;
pub const TYPE_SOA: u16 = 6;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_MX: u16 = 15;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_SRV: u16 = 33;
pub const TYPE_ANY: u16 = 255;
pub const TYPE_PRIVATE: u16 = 65280;

pub const RCODE_NOERROR: u16 = 0;
pub const RCODE_NXDOMAIN: u16 = 3;
pub const OPCODE_NOTIFY: u16 = 4;

pub fn ethernet(ip_packet: &[u8]) -> Vec<u8> {
    let ethertype: u16 = match ip_packet.first().map(|b| b >> 4) {
        Some(6) => 0x86dd,
        _ => 0x0800,
    };
    let mut frame = vec![0x02, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0x02];
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(ip_packet);
    frame
}

fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, body: &[u8]) -> Vec<u8> {
    let total = (20 + body.len()) as u16;
    let mut packet = vec![0x45, 0];
    packet.extend_from_slice(&total.to_be_bytes());
    packet.extend_from_slice(&[0, 0, 0x40, 0, 64, protocol, 0, 0]);
    packet.extend_from_slice(&src.octets());
    packet.extend_from_slice(&dst.octets());
    packet.extend_from_slice(body);
    packet
}

fn udp(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(8 + payload.len());
    datagram.extend_from_slice(&src_port.to_be_bytes());
    datagram.extend_from_slice(&dst_port.to_be_bytes());
    datagram.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    datagram.extend_from_slice(&[0, 0]);
    datagram.extend_from_slice(payload);
    datagram
}

fn tcp(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut segment = Vec::with_capacity(20 + payload.len());
    segment.extend_from_slice(&src_port.to_be_bytes());
    segment.extend_from_slice(&dst_port.to_be_bytes());
    segment.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1, 0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);
    segment.extend_from_slice(payload);
    segment
}

pub fn ipv4_udp(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    ipv4(src, dst, 17, &udp(src_port, dst_port, payload))
}

pub fn ipv4_tcp(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    ipv4(src, dst, 6, &tcp(src_port, dst_port, payload))
}

pub fn ipv4_icmp(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    ipv4(src, dst, 1, &[8, 0, 0, 0, 0, 1, 0, 1])
}

pub fn ipv6_udp(src: Ipv6Addr, dst: Ipv6Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let body = udp(src_port, dst_port, payload);
    let mut packet = vec![0x60, 0, 0, 0];
    packet.extend_from_slice(&(body.len() as u16).to_be_bytes());
    packet.extend_from_slice(&[17, 64]);
    packet.extend_from_slice(&src.octets());
    packet.extend_from_slice(&dst.octets());
    packet.extend_from_slice(&body);
    packet
}

/// UDP/IPv4 over Ethernet, already run through the packet parser.
pub fn udp_packet(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, dns: &[u8]) -> ParsedPacket {
    let frame = ethernet(&ipv4_udp(src, dst, src_port, dst_port, dns));
    ParsedPacket::parse(&frame, frame.len() as u32, LinkLayer::Ethernet).unwrap()
}

/// TCP/IPv4 over Ethernet with the DNS-over-TCP length prefix added.
pub fn tcp_packet(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, dns: &[u8]) -> ParsedPacket {
    let mut payload = (dns.len() as u16).to_be_bytes().to_vec();
    payload.extend_from_slice(dns);
    let frame = ethernet(&ipv4_tcp(src, dst, src_port, dst_port, &payload));
    ParsedPacket::parse(&frame, frame.len() as u32, LinkLayer::Ethernet).unwrap()
}

pub fn encode_name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.split('.').filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

/// One answer record; its owner name points back at the question name.
pub struct Rr {
    pub rtype: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl Rr {
    pub fn a(ip: Ipv4Addr, ttl: u32) -> Rr {
        Rr { rtype: TYPE_A, ttl, rdata: ip.octets().to_vec() }
    }

    pub fn aaaa(ip: Ipv6Addr, ttl: u32) -> Rr {
        Rr { rtype: TYPE_AAAA, ttl, rdata: ip.octets().to_vec() }
    }

    pub fn name(rtype: u16, target: &str, ttl: u32) -> Rr {
        Rr { rtype, ttl, rdata: encode_name(target) }
    }

    pub fn mx(preference: u16, exchange: &str, ttl: u32) -> Rr {
        let mut rdata = preference.to_be_bytes().to_vec();
        rdata.extend_from_slice(&encode_name(exchange));
        Rr { rtype: TYPE_MX, ttl, rdata }
    }

    pub fn soa(mname: &str, rname: &str, ttl: u32) -> Rr {
        let mut rdata = encode_name(mname);
        rdata.extend_from_slice(&encode_name(rname));
        for value in [2024010101u32, 7200, 3600, 1209600, 300] {
            rdata.extend_from_slice(&value.to_be_bytes());
        }
        Rr { rtype: TYPE_SOA, ttl, rdata }
    }

    pub fn srv(target: &str, port: u16, ttl: u32) -> Rr {
        let mut rdata = vec![0, 10, 0, 5];
        rdata.extend_from_slice(&port.to_be_bytes());
        rdata.extend_from_slice(&encode_name(target));
        Rr { rtype: TYPE_SRV, ttl, rdata }
    }

    pub fn txt(strings: &[&str], ttl: u32) -> Rr {
        let mut rdata = Vec::new();
        for s in strings {
            rdata.push(s.len() as u8);
            rdata.extend_from_slice(s.as_bytes());
        }
        Rr { rtype: TYPE_TXT, ttl, rdata }
    }

    pub fn raw(rtype: u16, rdata: &[u8], ttl: u32) -> Rr {
        Rr { rtype, ttl, rdata: rdata.to_vec() }
    }
}

fn dns_message(id: u16, flags: u16, name: &str, qtype: u16, answers: &[Rr]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(512);
    msg.extend_from_slice(&id.to_be_bytes());
    msg.extend_from_slice(&flags.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&(answers.len() as u16).to_be_bytes());
    msg.extend_from_slice(&[0, 0, 0, 0]);
    msg.extend_from_slice(&encode_name(name));
    msg.extend_from_slice(&qtype.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    for rr in answers {
        msg.extend_from_slice(&[0xc0, 0x0c]);
        msg.extend_from_slice(&rr.rtype.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&rr.ttl.to_be_bytes());
        msg.extend_from_slice(&(rr.rdata.len() as u16).to_be_bytes());
        msg.extend_from_slice(&rr.rdata);
    }
    msg
}

/// Standard query, recursion desired.
pub fn dns_query(id: u16, name: &str, qtype: u16) -> Vec<u8> {
    dns_message(id, 0x0100, name, qtype, &[])
}

pub fn dns_query_with_opcode(id: u16, opcode: u16, name: &str, qtype: u16) -> Vec<u8> {
    dns_message(id, (opcode & 0x0f) << 11, name, qtype, &[])
}

/// Standard query response echoing the question.
pub fn dns_response(id: u16, rcode: u16, name: &str, qtype: u16, answers: &[Rr]) -> Vec<u8> {
    dns_message(id, 0x8180 | (rcode & 0x0f), name, qtype, answers)
}
