use std::time::Duration;

/// Byte count and timing of one completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    pub bytes: u64,

    /// Elapsed time, rounded to the nearest millisecond.
    pub milliseconds: u64,

    /// `bytes / elapsed_seconds`, rounded to the nearest integer.
    /// Zero when no time elapsed.
    pub bytes_per_second: u64,
}

impl Throughput {
    pub fn measure(bytes: u64, elapsed: Duration) -> Self {
        let milliseconds = (elapsed.as_nanos() as f64 / 1e6).round() as u64;
        let bytes_per_second = if elapsed.is_zero() {
            0
        } else {
            (bytes as f64 / elapsed.as_secs_f64()).round() as u64
        };

        Self {
            bytes,
            milliseconds,
            bytes_per_second,
        }
    }
}
