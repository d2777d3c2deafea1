//! Validated runtime configuration.
//!
//! The command line hands over raw strings; everything the pipeline needs is
//! checked here once, before any capture handle is opened or worker spawned.

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::time::Instant;

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::sharder::ShardCount;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    Device(String),
    File(PathBuf),
}

/// How old a pending query may get before the GC sweep drops it.
///
/// Stored exactly as the operator wrote it: a negative offset from "now".
/// `-1m` means "entries inserted more than one minute ago".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcAge(TimeDelta);

impl GcAge {
    pub fn new(age: TimeDelta) -> Result<Self, ConfigError> {
        if age >= TimeDelta::zero() {
            return Err(ConfigError::NonNegativeGcAge(format!("{}ms", age.num_milliseconds())));
        }
        Ok(GcAge(age))
    }

    pub fn as_delta(&self) -> TimeDelta {
        self.0
    }

    /// `now + age`. `None` when the cutoff would fall before the clock's
    /// origin, in which case nothing can be old enough to expire.
    pub fn cutoff(&self, now: Instant) -> Option<Instant> {
        let back = self.0.abs().to_std().ok()?;
        now.checked_sub(back)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: CaptureSource,
    pub bpf: String,
    pub shards: ShardCount,
    pub queue_depth: usize,
    pub gc_age: GcAge,
    pub gc_interval: Duration,
    pub logfile: Option<PathBuf>,
    pub quiet: bool,
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let source = match (cli.device, cli.pcap) {
            (Some(device), _) if !device.is_empty() => CaptureSource::Device(device),
            (_, Some(file)) => CaptureSource::File(file),
            _ => return Err(ConfigError::MissingCaptureSource),
        };

        let gc_age = parse_go_duration(&cli.gc_age).map_err(|_| ConfigError::InvalidDuration {
            flag: "gc-age",
            value: cli.gc_age.clone(),
        })?;
        let gc_age = GcAge::new(gc_age).map_err(|_| ConfigError::NonNegativeGcAge(cli.gc_age.clone()))?;

        let gc_interval =
            parse_go_duration(&cli.gc_interval).map_err(|_| ConfigError::InvalidDuration {
                flag: "gc-interval",
                value: cli.gc_interval.clone(),
            })?;
        let gc_interval = match gc_interval.to_std() {
            Ok(interval) if !interval.is_zero() => interval,
            _ => return Err(ConfigError::NonPositiveInterval(cli.gc_interval)),
        };

        if cli.queue_depth == 0 {
            return Err(ConfigError::InvalidQueueDepth);
        }

        Ok(Config {
            source,
            bpf: cli.bpf,
            shards: ShardCount::new(cli.shards)?,
            queue_depth: cli.queue_depth,
            gc_age,
            gc_interval,
            logfile: cli.logfile,
            quiet: cli.quiet,
        })
    }
}

/// Parses a Go-style duration string: an optional sign followed by one or
/// more `<decimal><unit>` groups, e.g. `-1m`, `1h30m`, `1.5s`, `300ms`.
/// A bare `0` is accepted. The sign is preserved.
pub fn parse_go_duration(input: &str) -> Result<TimeDelta, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        flag: "duration",
        value: input.to_string(),
    };

    let (negative, mut rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };
    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let scale: i128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(invalid()),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let whole: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;
        if !fraction.is_empty() {
            if !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            // digits past 18 cannot change the result at nanosecond resolution
            let digits = &fraction[..fraction.len().min(18)];
            let value: i128 = digits.parse().map_err(|_| invalid())?;
            nanos += value * scale / 10i128.pow(digits.len() as u32);
        }
        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    if negative {
        total = -total;
    }
    let total = i64::try_from(total).map_err(|_| invalid())?;
    Ok(TimeDelta::nanoseconds(total))
}
