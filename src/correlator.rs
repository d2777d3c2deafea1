//! Per-shard query/response matching.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::GcAge;
use crate::dns::{self, DnsMessage};
use crate::parser::ParsedPacket;
use crate::record::{build_records, LogRecord};
use crate::shared_data::{CorrelationTable, PendingQuery};
use crate::stats::{DropReason, PipelineStats};

/// Work item for a shard. Sweeps travel through the same queue as packets
/// so the table only ever has one owner.
#[derive(Debug)]
pub enum ShardMessage {
    Packet(ParsedPacket),
    Sweep,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Query stored; `overwritten` is set when it replaced an in-flight one.
    Stored { overwritten: bool },
    Matched(Vec<LogRecord>),
    Ignored(DropReason),
}

#[derive(Debug, Default)]
pub struct Correlator {
    table: CorrelationTable,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.table.len()
    }

    /// Feeds one DNS message seen travelling `src -> dst`.
    ///
    /// For a response the source is the server and the destination the
    /// client; a query only needs its ID and question section.
    pub fn handle(&mut self, message: DnsMessage, src: IpAddr, dst: IpAddr, now: Instant) -> Outcome {
        if !message.is_standard_query() {
            return Outcome::Ignored(DropReason::NonQueryOpcode);
        }

        if message.is_response {
            return match self.table.take(message.id) {
                Some(query) => Outcome::Matched(build_records(
                    src,
                    dst,
                    &query.questions,
                    &message,
                    Utc::now(),
                )),
                None => Outcome::Ignored(DropReason::UnmatchedResponse),
            };
        }

        let replaced = self.table.insert(PendingQuery {
            id: message.id,
            questions: message.questions,
            inserted: now,
        });
        Outcome::Stored {
            overwritten: replaced.is_some(),
        }
    }

    /// Removes every pending query at least `|age|` old as of `now`.
    pub fn sweep(&mut self, now: Instant, age: GcAge) -> Vec<u16> {
        match age.cutoff(now) {
            Some(cutoff) => self.table.remove_older_than(cutoff),
            None => Vec::new(),
        }
    }
}

/// Drives one shard until its queue closes, then returns.
///
/// All records of a match are handed to `records` before the next message
/// is taken off the queue.
pub async fn shard_task(
    shard: usize,
    mut rx: mpsc::Receiver<ShardMessage>,
    records: mpsc::Sender<LogRecord>,
    gc_age: GcAge,
    stats: Arc<PipelineStats>,
) {
    let mut correlator = Correlator::new();
    debug!(shard, "shard started");

    while let Some(message) = rx.recv().await {
        match message {
            ShardMessage::Sweep => {
                let expired = correlator.sweep(Instant::now(), gc_age);
                for id in &expired {
                    debug!(shard, id, "expired pending query");
                }
                stats.add_drops(DropReason::Expired, expired.len() as u64);
                trace!(shard, pending = correlator.pending(), "gc sweep done");
            }
            ShardMessage::Packet(packet) => {
                let Some((src, dst)) = packet.endpoints() else {
                    stats.record_drop(DropReason::NoNetworkLayer);
                    continue;
                };
                let message = match dns::extract(&packet) {
                    Ok(message) => message,
                    Err(reason) => {
                        debug!(shard, %src, %dst, reason = reason.as_str(), "skipping packet");
                        stats.record_drop(reason);
                        continue;
                    }
                };
                let id = message.id;

                match correlator.handle(message, src, dst, Instant::now()) {
                    Outcome::Stored { overwritten } => {
                        stats.record_query();
                        if overwritten {
                            debug!(shard, id, "query id reused while in flight, older query lost");
                            stats.record_drop(DropReason::QueryOverwritten);
                        }
                    }
                    Outcome::Matched(matched) => {
                        stats.record_match(matched.len());
                        for record in matched {
                            if records.send(record).await.is_err() {
                                debug!(shard, "record channel closed, stopping shard");
                                return;
                            }
                        }
                    }
                    Outcome::Ignored(reason) => {
                        debug!(shard, id, %src, %dst, reason = reason.as_str(), "ignoring message");
                        stats.record_drop(reason);
                    }
                }
            }
        }
    }

    debug!(shard, pending = correlator.pending(), "shard queue closed");
}
