use std::time::Duration;

use tokio::sync::mpsc::WeakSender;
use tokio::time::{interval, MissedTickBehavior};
use tracing::trace;

use crate::correlator::ShardMessage;

/// Periodically asks one shard to sweep its table.
///
/// Holds only a weak handle to the shard queue so it never keeps a finished
/// shard alive; returns once the queue has closed.
pub async fn gc_task(shard: usize, every: Duration, queue: WeakSender<ShardMessage>) {
    let mut interval = interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // skip first tick

    loop {
        interval.tick().await;

        let Some(queue) = queue.upgrade() else {
            break;
        };
        if queue.send(ShardMessage::Sweep).await.is_err() {
            break;
        }
        trace!(shard, "gc sweep requested");
    }

    trace!(shard, "gc task stopped");
}
