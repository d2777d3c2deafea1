//! Flow sharding: routes every packet of a flow, in both directions, to the
//! same correlator shard.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::GcAge;
use crate::correlator::{shard_task, ShardMessage};
use crate::error::{ConfigError, SnifferError};
use crate::executor::gc_task;
use crate::parser::{PacketHeader, ParsedPacket};
use crate::record::LogRecord;
use crate::stats::{DropReason, PipelineStats};

/// Number of shards: a power of two so the shard index is a mask of the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardCount(usize);

impl ShardCount {
    pub const MAX: usize = 1024;

    pub fn new(count: usize) -> Result<Self, ConfigError> {
        if count == 0 || count > Self::MAX || !count.is_power_of_two() {
            return Err(ConfigError::InvalidShardCount {
                got: count,
                max: Self::MAX,
            });
        }
        Ok(ShardCount(count))
    }

    pub fn get(&self) -> usize {
        self.0
    }

    pub fn index(&self, hash: u64) -> usize {
        (hash & (self.0 as u64 - 1)) as usize
    }
}

impl Default for ShardCount {
    fn default() -> Self {
        ShardCount(8)
    }
}

/// Sending half of the shard queues, owned by the capture loop.
///
/// Dropping it closes every queue; each shard then drains what is left and
/// stops.
#[derive(Debug)]
pub struct Dispatcher {
    count: ShardCount,
    queues: Vec<mpsc::Sender<ShardMessage>>,
    stats: Arc<PipelineStats>,
}

impl Dispatcher {
    /// Shard for `packet`, or `None` when it has no network layer to hash.
    pub fn route(&self, packet: &ParsedPacket) -> Option<usize> {
        packet.flow_hash().map(|hash| self.count.index(hash))
    }

    /// Queues `packet` on its shard, waiting for room. Must not be called
    /// from async context.
    pub fn dispatch_blocking(&self, packet: ParsedPacket) -> Result<(), SnifferError> {
        let Some(shard) = self.admit(&packet) else {
            return Ok(());
        };
        self.queues[shard]
            .blocking_send(ShardMessage::Packet(packet))
            .map_err(|_| SnifferError::ShardClosed(shard))
    }

    /// Async form of [`Dispatcher::dispatch_blocking`] for driving the
    /// pipeline from a runtime thread.
    #[cfg(test)]
    pub async fn dispatch(&self, packet: ParsedPacket) -> Result<(), SnifferError> {
        let Some(shard) = self.admit(&packet) else {
            return Ok(());
        };
        self.queues[shard]
            .send(ShardMessage::Packet(packet))
            .await
            .map_err(|_| SnifferError::ShardClosed(shard))
    }

    fn admit(&self, packet: &ParsedPacket) -> Option<usize> {
        self.stats.record_packet();
        let shard = self.route(packet);
        match shard {
            Some(shard) => trace!(shard, len = packet.get_len(), "dispatching packet"),
            None => {
                let link = packet.get_headers().first().map_or("none", PacketHeader::name);
                debug!(len = packet.get_len(), link, "no network layer, dropping packet");
                self.stats.record_drop(DropReason::NoNetworkLayer);
            }
        }
        shard
    }
}

/// Settings the shard workers need.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub shards: ShardCount,
    pub queue_depth: usize,
    pub gc_age: GcAge,
    pub gc_interval: Duration,
}

/// Running shard workers and their GC tickers.
#[derive(Debug)]
pub struct Pipeline {
    workers: Vec<JoinHandle<()>>,
    sweepers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawns one worker and one GC ticker per shard. Records from every
    /// shard are sent to `records`.
    pub fn start(
        options: PipelineOptions,
        records: mpsc::Sender<LogRecord>,
        stats: Arc<PipelineStats>,
    ) -> (Dispatcher, Pipeline) {
        let count = options.shards.get();
        let mut queues = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);
        let mut sweepers = Vec::with_capacity(count);

        for shard in 0..count {
            let (tx, rx) = mpsc::channel(options.queue_depth);
            sweepers.push(tokio::spawn(gc_task(shard, options.gc_interval, tx.downgrade())));
            workers.push(tokio::spawn(shard_task(
                shard,
                rx,
                records.clone(),
                options.gc_age,
                Arc::clone(&stats),
            )));
            queues.push(tx);
        }
        debug!(shards = count, queue_depth = options.queue_depth, "pipeline started");

        let dispatcher = Dispatcher {
            count: options.shards,
            queues,
            stats,
        };
        (dispatcher, Pipeline { workers, sweepers })
    }

    /// Waits for every shard to drain. Only returns once the dispatcher has
    /// been dropped.
    pub async fn join(self) -> Result<(), SnifferError> {
        let mut result = Ok(());
        for worker in self.workers {
            if let Err(err) = worker.await {
                result = Err(SnifferError::Task(err));
            }
        }
        for sweeper in self.sweepers {
            sweeper.abort();
            match sweeper.await {
                Err(err) if !err.is_cancelled() => result = Err(SnifferError::Task(err)),
                _ => {}
            }
        }
        result
    }
}
