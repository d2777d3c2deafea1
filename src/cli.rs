use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dns_sniffer")]
#[command(version)]
#[command(
    about = "Passive DNS query/response logger",
    long_about = "Watches DNS traffic on a capture device or in a pcap file, pairs every answer with the \
                  query that asked for it and writes one JSON record per answer. Messages split across \
                  TCP segments are not reassembled and are skipped."
)]
pub struct Cli {
    /// Capture device to sniff on
    #[arg(short = 'd', long = "dev")]
    pub device: Option<String>,

    /// pcap file to replay instead of a live device
    #[arg(short = 'r', long = "pcap", value_name = "FILE")]
    pub pcap: Option<PathBuf>,

    /// BPF filter expression; packets without port 53 on either side are skipped regardless
    #[arg(short = 'f', long, default_value = "port 53")]
    pub bpf: String,

    /// Also append records to this file (recommended for debug only)
    #[arg(short = 'o', long = "logfile", value_name = "FILE")]
    pub logfile: Option<PathBuf>,

    /// Do not log records to stdout
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// How old a pending query must be before it is garbage collected (negative, e.g. -1m)
    #[arg(long, default_value = "-1m", allow_hyphen_values = true)]
    pub gc_age: String,

    /// How often to run garbage collection
    #[arg(long, default_value = "3m", allow_hyphen_values = true)]
    pub gc_interval: String,

    /// Number of packet-handling shards (power of two)
    #[arg(short = 's', long, default_value_t = 8)]
    pub shards: usize,

    /// Packets buffered per shard before capture blocks
    #[arg(long, default_value_t = 1024)]
    pub queue_depth: usize,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// List capture devices and exit
    #[arg(short = 'l', long)]
    pub list_devices: bool,
}
