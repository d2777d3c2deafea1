//! DNS extraction and the owned message model the correlator works on.
//!
//! Wire decoding is done by `hickory-proto`; the result is immediately
//! flattened into [`DnsMessage`] so a pending query can outlive the packet
//! buffer it came from, and so record types and values are a closed set of
//! variants with a lossless fallback.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{Name, RData, Record};
use hickory_proto::serialize::binary::BinEncodable;

use crate::parser::{ParsedPacket, Transport};
use crate::stats::DropReason;

/// DNS over TCP prefixes each message with its length (RFC 1035 4.2.2).
pub const TCP_LENGTH_PREFIX: usize = 2;
pub const DNS_PORT: u16 = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    NS,
    PTR,
    TXT,
    SOA,
    SRV,
    ANY,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            255 => RecordType::ANY,
            other => RecordType::Other(other),
        }
    }
}

impl From<hickory_proto::rr::RecordType> for RecordType {
    fn from(rtype: hickory_proto::rr::RecordType) -> Self {
        RecordType::from(u16::from(rtype))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::TXT => "TXT",
            RecordType::SOA => "SOA",
            RecordType::SRV => "SRV",
            RecordType::ANY => "ANY",
            RecordType::Other(code) => return write!(f, "{code}"),
        };
        f.write_str(name)
    }
}

/// Answer data reduced to what a log line carries.
///
/// MX keeps only the exchange, SOA only the responsible mailbox and SRV only
/// the target; priorities, weights, ports and SOA timers are not reproduced.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordValue {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    CNAME(String),
    MX(String),
    NS(String),
    PTR(String),
    TXT(String),
    SOA(String),
    SRV(String),
    Raw(Vec<u8>),
}

impl From<&RData> for RecordValue {
    fn from(rdata: &RData) -> Self {
        match rdata {
            RData::A(a) => RecordValue::A(a.0),
            RData::AAAA(aaaa) => RecordValue::AAAA(aaaa.0),
            RData::CNAME(cname) => RecordValue::CNAME(name_text(&cname.0)),
            RData::MX(mx) => RecordValue::MX(name_text(mx.exchange())),
            RData::NS(ns) => RecordValue::NS(name_text(&ns.0)),
            RData::PTR(ptr) => RecordValue::PTR(name_text(&ptr.0)),
            RData::TXT(txt) => RecordValue::TXT(
                txt.txt_data()
                    .iter()
                    .map(|segment| String::from_utf8_lossy(segment))
                    .collect(),
            ),
            RData::SOA(soa) => RecordValue::SOA(name_text(soa.rname())),
            RData::SRV(srv) => RecordValue::SRV(name_text(srv.target())),
            RData::Unknown { rdata, .. } => RecordValue::Raw(rdata.anything().to_vec()),
            RData::NULL(null) => RecordValue::Raw(null.anything().to_vec()),
            other => RecordValue::Raw(other.to_bytes().unwrap_or_default()),
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::A(ip) => write!(f, "{ip}"),
            RecordValue::AAAA(ip) => write!(f, "{ip}"),
            RecordValue::CNAME(text)
            | RecordValue::MX(text)
            | RecordValue::NS(text)
            | RecordValue::PTR(text)
            | RecordValue::TXT(text)
            | RecordValue::SOA(text)
            | RecordValue::SRV(text) => f.write_str(text),
            // may not be readable, but no bytes are lost
            RecordValue::Raw(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: RecordType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub rtype: RecordType,
    pub ttl: u32,
    pub value: RecordValue,
}

impl From<&Record> for Answer {
    fn from(record: &Record) -> Self {
        Answer {
            rtype: RecordType::from(record.record_type()),
            ttl: record.ttl(),
            value: RecordValue::from(record.data()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub id: u16,
    pub is_response: bool,
    pub op_code: OpCode,
    pub response_code: ResponseCode,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

impl DnsMessage {
    /// `None` when the bytes are not a well-formed DNS message.
    pub fn parse(bytes: &[u8]) -> Option<DnsMessage> {
        Message::from_vec(bytes).ok().map(|message| DnsMessage::from(&message))
    }

    pub fn is_standard_query(&self) -> bool {
        self.op_code == OpCode::Query
    }
}

impl From<&Message> for DnsMessage {
    fn from(message: &Message) -> Self {
        DnsMessage {
            id: message.id(),
            is_response: message.message_type() == MessageType::Response,
            op_code: message.op_code(),
            response_code: message.response_code(),
            questions: message
                .queries()
                .iter()
                .map(|query| Question {
                    name: name_text(query.name()),
                    qtype: RecordType::from(query.query_type()),
                })
                .collect(),
            answers: message.answers().iter().map(Answer::from).collect(),
        }
    }
}

/// Labels joined by `.` as they appear on the wire, without escaping and
/// without the trailing root dot; `""` for the root.
fn name_text(name: &Name) -> String {
    name.iter()
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(".")
}

/// Pulls the DNS message out of a decoded packet.
///
/// The error side is never fatal: it only says why the packet is skipped.
/// TCP segments are taken one at a time; a message spanning several
/// segments fails to parse and is dropped. Only traffic with port 53 on
/// one side is looked at, whatever the capture filter lets through.
pub fn extract(packet: &ParsedPacket) -> Result<DnsMessage, DropReason> {
    if !packet
        .ports()
        .is_some_and(|(src, dst)| src == DNS_PORT || dst == DNS_PORT)
    {
        return Err(match packet.transport() {
            Transport::Other => DropReason::UnsupportedTransport,
            _ => DropReason::NotDns,
        });
    }

    match packet.transport() {
        Transport::Udp => {
            let payload = packet.payload();
            if payload.is_empty() {
                return Err(DropReason::NotDns);
            }
            DnsMessage::parse(payload).ok_or(DropReason::NotDns)
        }
        Transport::Tcp => {
            let payload = packet.payload();
            if payload.is_empty() {
                return Err(DropReason::NoPayload);
            }
            let message = payload
                .get(TCP_LENGTH_PREFIX..)
                .filter(|m| !m.is_empty())
                .ok_or(DropReason::MalformedDns)?;
            DnsMessage::parse(message).ok_or(DropReason::MalformedDns)
        }
        Transport::Other => Err(DropReason::UnsupportedTransport),
    }
}
