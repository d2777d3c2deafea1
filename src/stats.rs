//! Pipeline counters.
//!
//! Every path that throws a packet or a pending query away bumps exactly one
//! [`DropReason`] counter, so operators and tests can see why traffic went
//! missing without scraping debug logs.

use std::sync::atomic::{AtomicU64, Ordering};

use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Frame decoded but carried no IPv4/IPv6 layer.
    NoNetworkLayer,
    /// Frame headers could not be decoded at all.
    Undecodable,
    /// Neither UDP nor TCP.
    UnsupportedTransport,
    /// TCP segment without application payload.
    NoPayload,
    /// UDP payload that is not a DNS message.
    NotDns,
    /// TCP payload that failed to parse after the length prefix.
    MalformedDns,
    /// DNS opcode other than standard Query.
    NonQueryOpcode,
    /// Response with no pending query under its ID.
    UnmatchedResponse,
    /// Pending query replaced by a newer query reusing its ID.
    QueryOverwritten,
    /// Pending query removed by the GC sweep.
    Expired,
}

impl DropReason {
    pub const ALL: [DropReason; 10] = [
        DropReason::NoNetworkLayer,
        DropReason::Undecodable,
        DropReason::UnsupportedTransport,
        DropReason::NoPayload,
        DropReason::NotDns,
        DropReason::MalformedDns,
        DropReason::NonQueryOpcode,
        DropReason::UnmatchedResponse,
        DropReason::QueryOverwritten,
        DropReason::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NoNetworkLayer => "no_network_layer",
            DropReason::Undecodable => "undecodable",
            DropReason::UnsupportedTransport => "unsupported_transport",
            DropReason::NoPayload => "no_payload",
            DropReason::NotDns => "not_dns",
            DropReason::MalformedDns => "malformed_dns",
            DropReason::NonQueryOpcode => "non_query_opcode",
            DropReason::UnmatchedResponse => "unmatched_response",
            DropReason::QueryOverwritten => "query_overwritten",
            DropReason::Expired => "expired",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Shared by the capture loop and every shard.
#[derive(Debug, Default)]
pub struct PipelineStats {
    packets: AtomicU64,
    queries: AtomicU64,
    matched: AtomicU64,
    records: AtomicU64,
    drops: [AtomicU64; DropReason::ALL.len()],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub packets: u64,
    pub queries: u64,
    pub matched: u64,
    pub records: u64,
    pub dropped: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self, records: usize) {
        self.matched.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_drop(&self, reason: DropReason) {
        self.add_drops(reason, 1);
    }

    pub fn add_drops(&self, reason: DropReason, count: u64) {
        self.drops[reason.index()].fetch_add(count, Ordering::Relaxed);
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.drops[reason.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            dropped: DropReason::ALL.iter().map(|r| self.dropped(*r)).sum(),
        }
    }

    /// Printed to stderr once a replay has drained.
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        eprintln!("{}", "DNS sniffer statistics".bold());
        eprintln!("{0: <24} {1: >12}", "packets captured", snapshot.packets);
        eprintln!("{0: <24} {1: >12}", "queries seen", snapshot.queries);
        eprintln!("{0: <24} {1: >12}", "answers matched", snapshot.matched);
        eprintln!("{0: <24} {1: >12}", "records emitted", snapshot.records.to_string().green());
        for reason in DropReason::ALL {
            let count = self.dropped(reason);
            if count > 0 {
                eprintln!("{0: <24} {1: >12}", reason.as_str(), count.to_string().yellow());
            }
        }
    }
}
