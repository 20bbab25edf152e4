//! Per-round transfer statistics.

use std::fmt;
use std::time::Duration;

const MIB: f64 = 1024.0 * 1024.0;

/// One completed round: how many bytes arrived and how long it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferRecord {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferRecord {
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    /// Throughput in MiB per second; zero for an instantaneous round.
    pub fn bandwidth_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / MIB / secs
    }
}

/// All rounds of one receiver run.
#[derive(Debug, Clone, Default)]
pub struct StatsLog {
    records: Vec<TransferRecord>,
}

impl StatsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TransferRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    pub fn average_elapsed(&self) -> Option<Duration> {
        if self.records.is_empty() {
            return None;
        }
        let total: Duration = self.records.iter().map(|r| r.elapsed).sum();
        Some(total / self.records.len() as u32)
    }

    /// Mean of the per-round bandwidths.
    pub fn average_bandwidth_mbps(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let total: f64 = self.records.iter().map(TransferRecord::bandwidth_mbps).sum();
        Some(total / self.records.len() as f64)
    }
}

impl fmt::Display for StatsLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "----------------------------------")?;
        writeln!(f, "- * Statistics * -")?;
        for (i, r) in self.records.iter().enumerate() {
            writeln!(
                f,
                "- Run #{} ({} bytes): time = {:.2} ms; speed = {:.2} MB/s",
                i + 1,
                r.bytes,
                r.elapsed.as_secs_f64() * 1000.0,
                r.bandwidth_mbps()
            )?;
        }
        match (self.average_elapsed(), self.average_bandwidth_mbps()) {
            (Some(time), Some(bw)) => {
                writeln!(f, "- Average time: {:.2} ms", time.as_secs_f64() * 1000.0)?;
                writeln!(f, "- Average bandwidth: {bw:.2} MB/s")?;
            }
            _ => writeln!(f, "- No completed transfers")?,
        }
        write!(f, "----------------------------------")
    }
}
