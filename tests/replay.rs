use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use dns_sniffer::config::{CaptureSource, Config, GcAge};
use dns_sniffer::sharder::ShardCount;
use dns_sniffer::LogRecord;

const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const RESOLVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 53);

fn name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

fn dns(id: u16, flags: u16, qname: &str, answers: &[[u8; 4]]) -> Vec<u8> {
    let mut msg = id.to_be_bytes().to_vec();
    msg.extend_from_slice(&flags.to_be_bytes());
    msg.extend_from_slice(&[0, 1]);
    msg.extend_from_slice(&(answers.len() as u16).to_be_bytes());
    msg.extend_from_slice(&[0, 0, 0, 0]);
    msg.extend_from_slice(&name(qname));
    msg.extend_from_slice(&[0, 1, 0, 1]);
    for ip in answers {
        msg.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1]);
        msg.extend_from_slice(&3600u32.to_be_bytes());
        msg.extend_from_slice(&[0, 4]);
        msg.extend_from_slice(ip);
    }
    msg
}

fn udp_frame(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut udp = sport.to_be_bytes().to_vec();
    udp.extend_from_slice(&dport.to_be_bytes());
    udp.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    udp.extend_from_slice(&[0, 0]);
    udp.extend_from_slice(payload);

    let mut ip = vec![0x45, 0];
    ip.extend_from_slice(&((20 + udp.len()) as u16).to_be_bytes());
    ip.extend_from_slice(&[0, 0, 0x40, 0, 64, 17, 0, 0]);
    ip.extend_from_slice(&src.octets());
    ip.extend_from_slice(&dst.octets());
    ip.extend_from_slice(&udp);

    let mut frame = vec![0x02, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0x02, 0x08, 0x00];
    frame.extend_from_slice(&ip);
    frame
}

fn write_pcap(path: &Path, frames: &[Vec<u8>]) {
    let mut file = Vec::new();
    file.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    file.extend_from_slice(&2u16.to_le_bytes());
    file.extend_from_slice(&4u16.to_le_bytes());
    file.extend_from_slice(&0i32.to_le_bytes());
    file.extend_from_slice(&0u32.to_le_bytes());
    file.extend_from_slice(&65535u32.to_le_bytes());
    file.extend_from_slice(&1u32.to_le_bytes());
    for (i, frame) in frames.iter().enumerate() {
        file.extend_from_slice(&(1_714_560_000u32 + i as u32).to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes());
        file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        file.extend_from_slice(frame);
    }
    std::fs::write(path, file).unwrap();
}

fn config(pcap: &Path, logfile: &Path) -> Config {
    Config {
        source: CaptureSource::File(pcap.to_path_buf()),
        bpf: "port 53".to_string(),
        shards: ShardCount::new(4).unwrap(),
        queue_depth: 16,
        gc_age: GcAge::new(TimeDelta::minutes(-1)).unwrap(),
        gc_interval: Duration::from_secs(180),
        logfile: Some(logfile.to_path_buf()),
        quiet: true,
    }
}

fn read_records(path: &Path) -> Vec<LogRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn replay_writes_one_record_per_answer() {
    let dir = tempfile::tempdir().unwrap();
    let pcap = dir.path().join("dns.pcap");
    let logfile = dir.path().join("records.json");

    write_pcap(
        &pcap,
        &[
            udp_frame(CLIENT, RESOLVER, 51000, 53, &dns(0x1234, 0x0100, "example.com", &[])),
            udp_frame(CLIENT, RESOLVER, 51001, 53, &dns(0x0002, 0x0100, "multi.example", &[])),
            // answer nobody asked for
            udp_frame(RESOLVER, CLIENT, 53, 51002, &dns(0x0bad, 0x8180, "stray.example", &[[1, 2, 3, 4]])),
            udp_frame(RESOLVER, CLIENT, 53, 51000, &dns(0x1234, 0x8180, "example.com", &[[93, 184, 216, 34]])),
            udp_frame(
                RESOLVER,
                CLIENT,
                53,
                51001,
                &dns(0x0002, 0x8180, "multi.example", &[[10, 0, 0, 1], [10, 0, 0, 2]]),
            ),
            // not port 53, filtered out by BPF
            udp_frame(CLIENT, RESOLVER, 51003, 5353, &dns(0x0003, 0x0100, "mdns.local", &[])),
        ],
    );

    dns_sniffer::sniffer::run(config(&pcap, &logfile)).await.unwrap();

    let mut records = read_records(&logfile);
    records.sort_by_key(|r| (r.query_id(), r.answer().to_string()));
    assert_eq!(records.len(), 3);

    assert_eq!(records[0].query_id(), 2);
    assert_eq!(records[0].answer(), "10.0.0.1");
    assert_eq!(records[1].answer(), "10.0.0.2");
    assert_eq!(records[0].timestamp(), records[1].timestamp());

    let single = &records[2];
    assert_eq!(single.query_id(), 0x1234);
    assert_eq!(single.question(), "example.com");
    assert_eq!(single.question_type(), "A");
    assert_eq!(single.answer(), "93.184.216.34");
    assert_eq!(single.answer_type(), "A");
    assert_eq!(single.ttl(), 3600);
    assert_eq!(single.server().to_string(), "10.0.0.53");
    assert_eq!(single.client().to_string(), "10.0.0.2");
}

#[tokio::test]
async fn replay_reports_failed_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let pcap = dir.path().join("nx.pcap");
    let logfile = dir.path().join("records.json");

    write_pcap(
        &pcap,
        &[
            udp_frame(CLIENT, RESOLVER, 52000, 53, &dns(7, 0x0100, "missing.example", &[])),
            udp_frame(RESOLVER, CLIENT, 53, 52000, &dns(7, 0x8183, "missing.example", &[])),
        ],
    );

    dns_sniffer::sniffer::run(config(&pcap, &logfile)).await.unwrap();

    let records = read_records(&logfile);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response_code(), 3);
    assert_eq!(records[0].answer_type(), "");
    assert_eq!(records[0].ttl(), 0);
    assert!(!records[0].answer().is_empty());
}
