use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Args;
use ferry_state::{ObjectRecord, Store};
use ferry_transfer::Retrieval;
use rand::seq::SliceRandom;

use crate::config::Config;

#[derive(Clone, Debug, Args)]
pub struct RetrieveArg {
    /// Smallest object to read, e.g. `512KiB` or `10MB`.
    #[arg(long, value_parser = parse_size, default_value = "0")]
    pub min:      u64,
    /// Largest object to read.
    #[arg(long, value_parser = parse_size)]
    pub max:      Option<u64>,
    /// How long to keep reading: `90s`, `5m`, or plain milliseconds.
    #[arg(long, value_parser = parse_duration, default_value = "5m")]
    pub duration: Duration,
}

/// Read randomly chosen stored objects back until `duration` has passed,
/// verifying each digest, then print averages.
pub async fn run(config: &Config, arg: &RetrieveArg) -> Result<()> {
    let store = Store::load(&config.status_file).context("failed to load state")?;
    let max = arg.max.unwrap_or(u64::MAX);
    let candidates: Vec<&ObjectRecord> = store
        .iter()
        .filter(|r| (arg.min..=max).contains(&r.byte_count))
        .collect();
    if candidates.is_empty() {
        bail!(
            "no stored objects between {} and {}",
            format_size(arg.min),
            arg.max.map_or_else(|| "unbounded".to_string(), format_size)
        );
    }

    tracing::info!(
        candidates = candidates.len(),
        seconds = arg.duration.as_secs(),
        "testing retrieval"
    );

    let deadline = Instant::now() + arg.duration;
    let mut probes = Vec::new();
    loop {
        let Some(record) = candidates.choose(&mut rand::thread_rng()) else {
            break;
        };
        let probe = ferry_transfer::retrieve(&config.endpoint_url, &record.id, &record.digest)
            .await
            .with_context(|| format!("failed to retrieve {} ({})", record.id, record.source_key))?;
        tracing::debug!(
            id = %record.id,
            bytes = probe.bytes,
            ttfb_ms = probe.ttfb.as_millis() as u64,
            ttlb_ms = probe.ttlb.as_millis() as u64,
            "retrieved"
        );
        probes.push(probe);

        if Instant::now() >= deadline {
            break;
        }
    }

    if let Some(summary) = Summary::of(&probes) {
        println!("Files fetched: {}", summary.count);
        println!("Average size:  {}", format_size(summary.bytes));
        println!("Average speed: {} / s", format_size(summary.bytes_per_second));
        println!("Average TTFB:  {:.3} ms", summary.ttfb.as_secs_f64() * 1e3);
        println!("Average TTLB:  {:.3} ms", summary.ttlb.as_secs_f64() * 1e3);
    }
    Ok(())
}

/// Averages over a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count:            usize,
    pub bytes:            u64,
    pub bytes_per_second: u64,
    pub ttfb:             Duration,
    pub ttlb:             Duration,
}

impl Summary {
    pub fn of(probes: &[Retrieval]) -> Option<Self> {
        if probes.is_empty() {
            return None;
        }
        let n = probes.len() as f64;
        let mean = |f: fn(&Retrieval) -> f64| probes.iter().map(f).sum::<f64>() / n;
        let mean_time = |f: fn(&Retrieval) -> Duration| {
            let total: u128 = probes.iter().map(|p| f(p).as_nanos()).sum();
            Duration::from_nanos((total / probes.len() as u128) as u64)
        };

        Some(Self {
            count:            probes.len(),
            bytes:            mean(|p| p.bytes as f64).round() as u64,
            bytes_per_second: mean(|p| p.bytes_per_second as f64).round() as u64,
            ttfb:             mean_time(|p| p.ttfb),
            ttlb:             mean_time(|p| p.ttlb),
        })
    }
}

const UNITS: &[(&str, u64)] = &[
    ("b", 1),
    ("kb", 1_000),
    ("mb", 1_000_000),
    ("gb", 1_000_000_000),
    ("tb", 1_000_000_000_000),
    ("kib", 1 << 10),
    ("mib", 1 << 20),
    ("gib", 1 << 30),
    ("tib", 1 << 40),
];

/// `1024`, `1.5MiB`, `10 MB`. Units are case-insensitive.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("expected a size like 10MiB, got '{s}'"))?;
    let unit = unit.trim().to_ascii_lowercase();
    let multiplier = if unit.is_empty() {
        1
    } else {
        UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, m)| *m)
            .ok_or_else(|| format!("unknown size unit '{unit}'"))?
    };
    Ok((value * multiplier as f64).round() as u64)
}

/// `30s`, `5m`, or a bare number of milliseconds. Must be positive.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit_ms) = if let Some(rest) = s.strip_suffix('m') {
        (rest.trim(), 60_000)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest.trim(), 1_000)
    } else {
        (s, 1)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("expected a duration integer, got '{digits}'"));
    }
    let count: u64 = digits.parse().map_err(|e| format!("{e}"))?;
    if count == 0 {
        return Err(format!("duration must be > 0, got '{s}'"));
    }
    Ok(Duration::from_millis(count.saturating_mul(unit_ms)))
}

/// Binary units with two decimals, e.g. `1.50 MiB`.
pub fn format_size(bytes: u64) -> String {
    const STEPS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut step = 0;
    while value >= 1024.0 && step + 1 < STEPS.len() {
        value /= 1024.0;
        step += 1;
    }
    if step == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", STEPS[step])
    }
}
