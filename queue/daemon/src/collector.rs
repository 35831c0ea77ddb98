//! Sample collection and aggregation
//!
//! Aggregates kernel buffer reports, time-squeeze reports and transmit
//! latencies into the end-of-run [`ExperimentReport`].

use crate::{
    report::{BufferDepthSink, TimeSqueezeSink},
    types::*,
    workload::LatencyHandler,
};
use log::debug;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Default)]
struct SocketTrack {
    samples: u64,
    receive_queue_depth: u64,
    max_receive_queue_depth: u64,
    first_drops: u64,
    drops: u64,
}

#[derive(Default)]
struct CpuTrack {
    samples: u64,
    first: u64,
    latest: u64,
}

#[derive(Default)]
struct Samples {
    /// All latency samples in microseconds (for percentile calculation)
    latencies_us: Vec<f64>,
    histogram: LatencyHistogram,
    sockets: HashMap<SocketInstanceId, SocketTrack>,
    cpus: BTreeMap<u32, CpuTrack>,
}

/// Shared collector fed by the monitors and the receive loop
///
/// Clones share the same samples.
#[derive(Clone, Default)]
pub struct SampleCollector {
    samples: Arc<Mutex<Samples>>,
}

impl SampleCollector {
    /// Create a new collector
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Samples> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one transmit latency
    pub fn add_latency(&self, nanos: u64) {
        let latency_us = nanos as f64 / 1000.0;
        let mut samples = self.lock();
        samples.latencies_us.push(latency_us);
        samples.histogram.add_sample(latency_us);
    }

    /// Record one buffer-depth report
    pub fn add_buffer_depth(&self, report: &BufferDepthReport) {
        debug!(
            "socket {} depth={} drops={}",
            report.instance, report.receive_queue_depth, report.drops
        );

        let mut samples = self.lock();
        let track = samples.sockets.entry(report.instance).or_insert_with(|| SocketTrack {
            first_drops: report.drops,
            ..SocketTrack::default()
        });
        track.samples += 1;
        track.receive_queue_depth = report.receive_queue_depth;
        track.max_receive_queue_depth = track.max_receive_queue_depth.max(report.receive_queue_depth);
        track.drops = report.drops;
    }

    /// Record one time-squeeze report
    pub fn add_time_squeeze(&self, report: &TimeSqueezeReport) {
        debug!("cpu {} time_squeeze={}", report.cpu, report.time_squeeze);

        let mut samples = self.lock();
        let track = samples.cpus.entry(report.cpu).or_insert_with(|| CpuTrack {
            first: report.time_squeeze,
            ..CpuTrack::default()
        });
        track.samples += 1;
        track.latest = report.time_squeeze;
    }

    /// Get current latency sample count
    pub fn latency_count(&self) -> usize {
        self.lock().latencies_us.len()
    }

    /// Get number of socket instances seen
    pub fn socket_count(&self) -> usize {
        self.lock().sockets.len()
    }

    /// Generate the aggregated report
    ///
    /// # Arguments
    ///
    /// * `elapsed_secs` - Duration of collection period in seconds
    ///
    /// Tick and workload counters are left at their defaults for the caller
    /// to fill in.
    pub fn generate_report(&self, elapsed_secs: u64) -> ExperimentReport {
        let samples = self.lock();

        let sockets = samples
            .sockets
            .iter()
            .map(|(instance, track)| {
                (
                    instance.to_string(),
                    SocketBufferStats {
                        transport: format!("{:016x}", instance.transport().0),
                        inode: instance.inode(),
                        samples: track.samples,
                        receive_queue_depth: track.receive_queue_depth,
                        max_receive_queue_depth: track.max_receive_queue_depth,
                        drops: track.drops,
                        // Counters may wrap
                        drops_during_run: track.drops.wrapping_sub(track.first_drops),
                    },
                )
            })
            .collect();

        let cpus = samples
            .cpus
            .iter()
            .map(|(&cpu, track)| CpuSqueezeStats {
                cpu,
                samples: track.samples,
                time_squeeze: track.latest,
                time_squeeze_during_run: track.latest.wrapping_sub(track.first),
            })
            .collect();

        ExperimentReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            duration_seconds: elapsed_secs,
            latency: summarize_latency(&samples.latencies_us, &samples.histogram),
            sockets,
            cpus,
            ticks: TickStats::default(),
            workload: WorkloadStats::default(),
        }
    }
}

fn summarize_latency(latencies_us: &[f64], histogram: &LatencyHistogram) -> LatencySummary {
    if latencies_us.is_empty() {
        return LatencySummary::default();
    }

    let sum: f64 = latencies_us.iter().sum();
    let avg = sum / latencies_us.len() as f64;
    let min = latencies_us.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = latencies_us.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    LatencySummary {
        samples: latencies_us.len() as u64,
        min_latency_us: min,
        max_latency_us: max,
        avg_latency_us: avg,
        std_dev_us: calculate_std_dev(latencies_us, avg),
        percentiles: calculate_percentiles(latencies_us.to_vec()),
        histogram: histogram.clone(),
    }
}

impl BufferDepthSink for SampleCollector {
    fn on_buffer_depth(&mut self, report: &BufferDepthReport) {
        self.add_buffer_depth(report);
    }
}

impl TimeSqueezeSink for SampleCollector {
    fn on_time_squeeze(&mut self, report: &TimeSqueezeReport) {
        self.add_time_squeeze(report);
    }
}

impl LatencyHandler for SampleCollector {
    fn on_latency(&mut self, nanos: u64) {
        self.add_latency(nanos);
    }
}
