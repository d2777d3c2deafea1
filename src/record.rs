//! Correlated log records and the builder that produces them.

use std::net::IpAddr;
use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use hickory_proto::op::ResponseCode;
use serde::{Deserialize, Serialize};

use crate::dns::{Answer, DnsMessage, Question};
use crate::error::EncodeError;

/// One observed answer, paired with the question that asked for it.
///
/// Serializes as a flat JSON object whose keys are always present. The
/// encoded form is computed once and cached; the cache is not part of the
/// record's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    query_id: u16,
    response_code: u16,
    question: String,
    question_type: String,
    answer: String,
    answer_type: String,
    ttl: u32,
    server: IpAddr,
    client: IpAddr,
    timestamp: String,

    #[serde(skip)]
    encoded: OnceLock<Result<Vec<u8>, EncodeError>>,
}

impl PartialEq for LogRecord {
    fn eq(&self, other: &Self) -> bool {
        self.query_id == other.query_id
            && self.response_code == other.response_code
            && self.question == other.question
            && self.question_type == other.question_type
            && self.answer == other.answer
            && self.answer_type == other.answer_type
            && self.ttl == other.ttl
            && self.server == other.server
            && self.client == other.client
            && self.timestamp == other.timestamp
    }
}

impl Eq for LogRecord {}

/// Fields shared by every record produced from one matched exchange.
struct Exchange<'a> {
    query_id: u16,
    response_code: u16,
    question: &'a str,
    question_type: String,
    server: IpAddr,
    client: IpAddr,
    timestamp: &'a str,
}

impl LogRecord {
    fn new(exchange: &Exchange<'_>, answer: String, answer_type: String, ttl: u32) -> LogRecord {
        let record = LogRecord {
            query_id: exchange.query_id,
            response_code: exchange.response_code,
            question: exchange.question.to_string(),
            question_type: exchange.question_type.clone(),
            answer,
            answer_type,
            ttl,
            server: exchange.server,
            client: exchange.client,
            timestamp: exchange.timestamp.to_string(),
            encoded: OnceLock::new(),
        };
        // encode eagerly so sinks only ever read the cache
        let _ = record.encode();
        record
    }

    /// JSON bytes of the record, or the error that prevented encoding.
    pub fn encode(&self) -> Result<&[u8], EncodeError> {
        self.encoded
            .get_or_init(|| serde_json::to_vec(self).map_err(EncodeError::from))
            .as_deref()
            .map_err(|err| err.clone())
    }

    /// Length of the encoded form, 0 if encoding failed.
    #[cfg(test)]
    pub fn encoded_len(&self) -> usize {
        self.encode().map(<[u8]>::len).unwrap_or(0)
    }

    pub fn query_id(&self) -> u16 {
        self.query_id
    }

    pub fn response_code(&self) -> u16 {
        self.response_code
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn question_type(&self) -> &str {
        &self.question_type
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn answer_type(&self) -> &str {
        &self.answer_type
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn server(&self) -> IpAddr {
        self.server
    }

    pub fn client(&self) -> IpAddr {
        self.client
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

/// RFC 3339 in UTC with second precision, e.g. `2024-05-01T12:00:00Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Turns a matched query and response into log records.
///
/// `server` is the source of the response packet and `client` its
/// destination. A failed lookup yields a single record whose answer is the
/// response code's name; a successful one yields one record per answer RR
/// (none if the answer section is empty). Only the first question is
/// reported; multi-question messages do not occur in practice.
pub fn build_records(
    server: IpAddr,
    client: IpAddr,
    questions: &[Question],
    reply: &DnsMessage,
    observed_at: DateTime<Utc>,
) -> Vec<LogRecord> {
    let timestamp = format_timestamp(observed_at);
    let (question, question_type) = match questions.first() {
        Some(q) => (q.name.as_str(), q.qtype.to_string()),
        None => ("", String::new()),
    };
    let exchange = Exchange {
        query_id: reply.id,
        response_code: u16::from(reply.response_code),
        question,
        question_type,
        server,
        client,
        timestamp: &timestamp,
    };

    if reply.response_code != ResponseCode::NoError {
        return vec![LogRecord::new(
            &exchange,
            reply.response_code.to_string(),
            String::new(),
            0,
        )];
    }

    reply
        .answers
        .iter()
        .map(|Answer { rtype, ttl, value }| {
            LogRecord::new(&exchange, value.to_string(), rtype.to_string(), *ttl)
        })
        .collect()
}
