//! Record outputs: one JSON object per line.

use std::path::Path;
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SnifferError;
use crate::record::LogRecord;

/// Buffered line writer over any async byte sink.
pub struct LineSink<W> {
    name: &'static str,
    writer: BufWriter<W>,
    written: u64,
}

impl<W: AsyncWrite + Unpin> LineSink<W> {
    pub fn new(name: &'static str, writer: W) -> Self {
        LineSink {
            name,
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    /// Writes one record. Records that failed to encode are skipped with a
    /// warning and reported as `false`.
    pub async fn write(&mut self, record: &LogRecord) -> std::io::Result<bool> {
        let bytes = match record.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(sink = self.name, id = record.query_id(), "{err}");
                return Ok(false);
            }
        };
        self.writer.write_all(bytes).await?;
        self.writer.write_all(b"\n").await?;
        self.written += 1;
        Ok(true)
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush().await
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Drains `rx` into `sink` until every sender is gone. The buffer is flushed
/// whenever the queue runs empty, so a quiet live capture still shows its
/// records promptly.
pub async fn sink_task<W>(
    mut sink: LineSink<W>,
    mut rx: mpsc::Receiver<Arc<LogRecord>>,
) -> Result<LineSink<W>, SnifferError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(record) = rx.recv().await {
        sink.write(&record).await?;
        if rx.is_empty() {
            sink.flush().await?;
        }
    }
    sink.flush().await?;
    debug!(sink = sink.name, written = sink.written(), "sink closed");
    Ok(sink)
}

/// Copies every record from the shards to each output.
///
/// An output whose task has stopped is dropped from the set; the others keep
/// receiving.
pub async fn run_fanout(mut records: mpsc::Receiver<LogRecord>, mut outputs: Vec<mpsc::Sender<Arc<LogRecord>>>) {
    while let Some(record) = records.recv().await {
        let record = Arc::new(record);
        let mut index = 0;
        while index < outputs.len() {
            if outputs[index].send(Arc::clone(&record)).await.is_err() {
                warn!("record output closed, removing it");
                outputs.swap_remove(index);
            } else {
                index += 1;
            }
        }
    }
}

/// The running fan-out and its outputs.
pub struct Sinks {
    fanout: JoinHandle<()>,
    outputs: Vec<JoinHandle<Result<(), SnifferError>>>,
}

impl Sinks {
    /// Opens the configured outputs and returns the channel the shards feed.
    ///
    /// The log file is opened for appending and created if missing; failing
    /// to open it is a startup error.
    pub async fn open(
        logfile: Option<&Path>,
        quiet: bool,
        depth: usize,
    ) -> Result<(mpsc::Sender<LogRecord>, Sinks), SnifferError> {
        let mut senders = Vec::new();
        let mut outputs = Vec::new();

        if let Some(path) = logfile {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .await
                .map_err(|source| SnifferError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            let (tx, rx) = mpsc::channel(depth);
            senders.push(tx);
            outputs.push(spawn_sink(LineSink::new("file", file), rx));
        }
        if !quiet {
            let (tx, rx) = mpsc::channel(depth);
            senders.push(tx);
            outputs.push(spawn_sink(LineSink::new("stdout", tokio::io::stdout()), rx));
        }
        if senders.is_empty() {
            warn!("--quiet without --logfile: records will be counted but not written");
        }

        let (records_tx, records_rx) = mpsc::channel(depth);
        let fanout = tokio::spawn(run_fanout(records_rx, senders));
        Ok((records_tx, Sinks { fanout, outputs }))
    }

    /// Waits for all outputs to flush. Returns after every record sender has
    /// been dropped.
    pub async fn join(self) -> Result<(), SnifferError> {
        self.fanout.await?;
        for output in self.outputs {
            output.await??;
        }
        Ok(())
    }
}

fn spawn_sink<W>(sink: LineSink<W>, rx: mpsc::Receiver<Arc<LogRecord>>) -> JoinHandle<Result<(), SnifferError>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move { sink_task(sink, rx).await.map(|_| ()) })
}
