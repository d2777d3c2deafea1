use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;
use pcap::{Activated, Capture, Device, Linktype};
use tracing::{debug, error, info};

use crate::config::{CaptureSource, Config};
use crate::error::SnifferError;
use crate::parser::{LinkLayer, ParsedPacket};
use crate::sharder::{Dispatcher, Pipeline, PipelineOptions};
use crate::sink::Sinks;
use crate::stats::{DropReason, PipelineStats};

const SNAPLEN: i32 = 65535;
const READ_TIMEOUT_MS: i32 = 1000;

pub fn list_devices() -> Result<Vec<Device>, SnifferError> {
    let devices = Device::list()?;

    for (index, device) in devices.iter().enumerate() {
        println!(
            "Device #{} | Name: {} | Description: {}",
            index.to_string().bold(),
            device.name.green(),
            device.desc.as_deref().unwrap_or("-")
        );
    }

    Ok(devices)
}

/// Opens the live device or the replay file and installs the BPF filter.
pub fn open_capture(source: &CaptureSource, bpf: &str) -> Result<Capture<dyn Activated>, SnifferError> {
    let mut capture: Capture<dyn Activated> = match source {
        CaptureSource::Device(name) => Capture::from_device(name.as_str())?
            .promisc(true)
            .snaplen(SNAPLEN)
            .timeout(READ_TIMEOUT_MS)
            .open()?
            .into(),
        CaptureSource::File(path) => open_file(path)?.into(),
    };
    capture.filter(bpf, true)?;
    Ok(capture)
}

fn open_file(path: &Path) -> Result<Capture<pcap::Offline>, SnifferError> {
    if let Err(source) = std::fs::metadata(path) {
        return Err(SnifferError::Open {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(Capture::from_file(path)?)
}

pub fn link_layer(linktype: Linktype) -> Result<LinkLayer, SnifferError> {
    match linktype {
        Linktype::ETHERNET => Ok(LinkLayer::Ethernet),
        Linktype::LINUX_SLL => Ok(LinkLayer::LinuxCooked),
        Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => Ok(LinkLayer::RawIp),
        other => Err(SnifferError::UnsupportedLinkType(other.0)),
    }
}

/// Reads frames until the replay ends, `stop` is raised or the shards go
/// away. Returns the number of frames read.
fn capture_loop(
    mut capture: Capture<dyn Activated>,
    link: LinkLayer,
    dispatcher: Dispatcher,
    stats: Arc<PipelineStats>,
    stop: Arc<AtomicBool>,
) -> Result<u64, SnifferError> {
    let mut frames = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let packet = match capture.next_packet() {
            Ok(packet) => packet,
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => {
                debug!(frames, "end of capture file");
                break;
            }
            Err(err) => return Err(err.into()),
        };
        frames += 1;

        match ParsedPacket::parse(packet.data, packet.header.len, link) {
            Ok(parsed) => dispatcher.dispatch_blocking(parsed)?,
            Err(err) => {
                debug!(len = packet.header.len, "{err}");
                stats.record_packet();
                stats.record_drop(DropReason::Undecodable);
            }
        }
    }

    Ok(frames)
}

/// Runs the whole pipeline: capture, shards, sinks.
///
/// A replay returns once every packet has been correlated and every record
/// written. A live capture runs until Ctrl-C, then drains the same way.
pub async fn run(config: Config) -> Result<(), SnifferError> {
    let capture = open_capture(&config.source, &config.bpf)?;
    let link = link_layer(capture.get_datalink())?;
    match &config.source {
        CaptureSource::Device(name) => info!(device = %name, filter = %config.bpf, "capturing live traffic"),
        CaptureSource::File(path) => info!(file = %path.display(), filter = %config.bpf, "replaying capture file"),
    }
    debug!(
        shards = config.shards.get(),
        queue_depth = config.queue_depth,
        gc_age_ms = config.gc_age.as_delta().num_milliseconds(),
        gc_interval = ?config.gc_interval,
        "pipeline settings"
    );

    let stats = Arc::new(PipelineStats::new());
    let (records, sinks) = Sinks::open(config.logfile.as_deref(), config.quiet, config.queue_depth).await?;
    let (dispatcher, pipeline) = Pipeline::start(
        PipelineOptions {
            shards: config.shards,
            queue_depth: config.queue_depth,
            gc_age: config.gc_age,
            gc_interval: config.gc_interval,
        },
        records,
        Arc::clone(&stats),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = Arc::clone(&stop);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, draining");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    let capture_stats = Arc::clone(&stats);
    let captured = tokio::task::spawn_blocking(move || capture_loop(capture, link, dispatcher, capture_stats, stop)).await;
    signal.abort();

    // queues are closed now that the dispatcher is gone
    pipeline.join().await?;
    sinks.join().await?;

    match captured? {
        Ok(frames) => {
            debug!(frames, "capture finished");
            stats.print_summary();
            Ok(())
        }
        Err(err) => {
            error!("capture stopped: {err}");
            Err(err)
        }
    }
}
