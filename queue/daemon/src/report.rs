//! Report sinks and the periodic monitor seam
//!
//! Sinks are called synchronously on the sampling task, once per owned
//! socket or per CPU, in table order. A slow sink delays the next tick.

use anyhow::Result;
use queue_probe_common::{BufferDepthReport, TimeSqueezeReport};

/// Receives buffer-depth reports
pub trait BufferDepthSink {
    fn on_buffer_depth(&mut self, report: &BufferDepthReport);
}

/// Receives time-squeeze reports
pub trait TimeSqueezeSink {
    fn on_time_squeeze(&mut self, report: &TimeSqueezeReport);
}

impl BufferDepthSink for Vec<BufferDepthReport> {
    fn on_buffer_depth(&mut self, report: &BufferDepthReport) {
        self.push(*report);
    }
}

impl TimeSqueezeSink for Vec<TimeSqueezeReport> {
    fn on_time_squeeze(&mut self, report: &TimeSqueezeReport) {
        self.push(*report);
    }
}

/// A monitor sampled once per tick
pub trait KernelMonitor {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Take one sample and hand the results to the monitor's sink
    ///
    /// An error fails this tick only; the next call starts afresh.
    fn report(&mut self) -> Result<()>;
}
