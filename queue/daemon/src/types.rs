//! Userspace type definitions
//!
//! Defines the report produced at the end of an experiment and the
//! aggregation helpers used to build it.
//!
//! ## Organization
//!
//! - **Shared Types**: socket identity and per-tick reports, re-exported
//!   from `queue_probe_common`
//! - **Report Types**: the end-of-run summary written by the exporters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use queue_probe_common::{BufferDepthReport, SocketIdentifier, SocketInstanceId, TimeSqueezeReport};

/// Summary of one experiment run
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExperimentReport {
    /// ISO 8601 timestamp when the report was generated
    pub timestamp: String,
    /// Duration of the run in seconds
    pub duration_seconds: u64,
    /// Transmit latency across all received messages
    pub latency: LatencySummary,
    /// Per socket instance buffer statistics, keyed by instance
    pub sockets: BTreeMap<String, SocketBufferStats>,
    /// Per CPU time-squeeze statistics, in CPU order
    pub cpus: Vec<CpuSqueezeStats>,
    /// Sampling task statistics
    pub ticks: TickStats,
    /// Synthetic workload counters
    pub workload: WorkloadStats,
}

/// Transmit latency statistics
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LatencySummary {
    /// Number of latency samples
    pub samples: u64,
    /// Minimum latency in microseconds
    pub min_latency_us: f64,
    /// Maximum latency in microseconds
    pub max_latency_us: f64,
    /// Average latency in microseconds
    pub avg_latency_us: f64,
    /// Standard deviation in microseconds
    pub std_dev_us: f64,
    /// Latency percentiles in microseconds
    pub percentiles: Percentiles,
    /// Latency histogram
    pub histogram: LatencyHistogram,
}

/// Buffer statistics of one socket instance
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketBufferStats {
    /// Transport identifier in hex
    pub transport: String,
    /// Kernel inode
    pub inode: u64,
    /// Ticks on which the socket was reported
    pub samples: u64,
    /// Receive-queue depth at the last sample
    pub receive_queue_depth: u64,
    /// Largest receive-queue depth seen
    pub max_receive_queue_depth: u64,
    /// Kernel drop counter at the last sample
    pub drops: u64,
    /// Drops between the first and last sample
    pub drops_during_run: u64,
}

/// Time-squeeze statistics of one CPU
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuSqueezeStats {
    /// CPU row index
    pub cpu: u32,
    /// Ticks on which the CPU was reported
    pub samples: u64,
    /// Counter at the last sample
    pub time_squeeze: u64,
    /// Squeezes between the first and last sample
    pub time_squeeze_during_run: u64,
}

/// Sampling task statistics
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks fired
    pub ticks: u64,
    /// Monitor samples that failed
    pub failed_samples: u64,
}

/// Synthetic workload counters
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadStats {
    /// Datagrams sent
    pub sent: u64,
    /// Datagrams that failed to send
    pub send_errors: u64,
    /// Datagrams received with a valid header
    pub received: u64,
    /// Datagrams too short to carry a header
    pub undersized: u64,
    /// Receive calls that failed
    pub receive_errors: u64,
}

impl WorkloadStats {
    /// Combine sender and receiver counters
    pub fn merge(self, other: WorkloadStats) -> Self {
        Self {
            sent: self.sent + other.sent,
            send_errors: self.send_errors + other.send_errors,
            received: self.received + other.received,
            undersized: self.undersized + other.undersized,
            receive_errors: self.receive_errors + other.receive_errors,
        }
    }
}

/// Upper bounds of the latency histogram buckets in microseconds
///
/// Loopback datagrams mostly land below 100μs; the coarse tail catches
/// receive-queue build-up. Samples above the last bound go to an overflow
/// bucket.
pub const LATENCY_BUCKET_BOUNDS_US: [f64; 7] = [10.0, 25.0, 50.0, 100.0, 250.0, 1_000.0, 10_000.0];

/// Latency histogram
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct LatencyHistogram {
    /// One count per bound in [`LATENCY_BUCKET_BOUNDS_US`], then overflow
    pub counts: [u64; LATENCY_BUCKET_BOUNDS_US.len() + 1],
    /// Sum of all samples in microseconds
    pub sum_us: f64,
}

impl LatencyHistogram {
    pub fn add_sample(&mut self, latency_us: f64) {
        let bucket = LATENCY_BUCKET_BOUNDS_US
            .iter()
            .position(|&bound| latency_us < bound)
            .unwrap_or(LATENCY_BUCKET_BOUNDS_US.len());
        self.counts[bucket] += 1;
        self.sum_us += latency_us;
    }

    /// Cumulative counts paired with their upper bound, `None` for `+Inf`
    pub fn cumulative(&self) -> impl Iterator<Item = (Option<f64>, u64)> + '_ {
        let bounds = LATENCY_BUCKET_BOUNDS_US.iter().copied().map(Some).chain([None]);
        bounds.zip(self.counts.iter().scan(0u64, |total, &count| {
            *total += count;
            Some(*total)
        }))
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Latency percentiles in microseconds
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct Percentiles {
    /// 50th percentile (median)
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 99th percentile
    pub p99: f64,
    /// 99.9th percentile
    pub p999: f64,
    /// 99.99th percentile
    pub p9999: f64,
}

/// Nearest-rank percentiles; sorts `samples` in place
pub fn calculate_percentiles(mut samples: Vec<f64>) -> Percentiles {
    if samples.is_empty() {
        return Percentiles::default();
    }

    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let len = samples.len();

    // Rank out of 10,000
    let percentile = |rank: usize| {
        let index = std::cmp::min((len * rank / 10_000).saturating_sub(1), len - 1);
        samples[index]
    };

    Percentiles {
        p50: percentile(5_000),
        p90: percentile(9_000),
        p99: percentile(9_900),
        p999: percentile(9_990),
        p9999: percentile(9_999),
    }
}

/// Population standard deviation of `samples` around `mean`
pub fn calculate_std_dev(samples: &[f64], mean: f64) -> f64 {
    if samples.len() <= 1 {
        return 0.0;
    }

    let variance: f64 = samples
        .iter()
        .map(|x| (x - mean).powi(2))
        .sum::<f64>()
        / samples.len() as f64;
    variance.sqrt()
}
