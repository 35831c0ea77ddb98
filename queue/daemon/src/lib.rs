//! UDP Queue Probe Userspace Library
//!
//! Samples kernel receive-buffer depth and drops for the sockets this
//! process owns, and per-CPU softirq time squeezes, while a synthetic UDP
//! workload measures transmit latency.

pub mod buffer_depth;
pub mod collector;
pub mod config;
pub mod experiment;
pub mod exporter;
pub mod ownership;
pub mod parse;
pub mod pseudo_file;
pub mod report;
pub mod softnet;
pub mod types;
pub mod udp_table;
pub mod workload;

pub use buffer_depth::KernelBufferDepthMonitor;
pub use collector::SampleCollector;
pub use config::ExperimentConfig;
pub use experiment::{Experiment, ExperimentOutcome, ShutdownOutcome};
pub use exporter::{ExporterType, JsonExporter, MetricsExporter, PrometheusExporter};
pub use pseudo_file::PseudoFileReader;
pub use report::{BufferDepthSink, KernelMonitor, TimeSqueezeSink};
pub use softnet::SoftIrqTimeSqueezeMonitor;
pub use types::*;
