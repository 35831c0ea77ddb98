//! Report exporters
//!
//! Writes the end-of-run report as JSON or Prometheus text.

use crate::types::ExperimentReport;
use anyhow::{Context, Result};
use std::{
    fmt::Write as _,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

/// Trait for report exporters
pub trait MetricsExporter {
    /// Export a report
    ///
    /// # Arguments
    ///
    /// * `report` - Aggregated experiment report
    fn export(&self, report: &ExperimentReport) -> Result<()>;
}

/// Export format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterType {
    /// JSON format
    Json,
    /// Prometheus format
    Prometheus,
}

impl ExporterType {
    /// Parse a format name as given on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "json" => Some(ExporterType::Json),
            "prometheus" | "prom" => Some(ExporterType::Prometheus),
            _ => None,
        }
    }
}

/// JSON exporter
pub struct JsonExporter {
    output_path: PathBuf,
    pretty: bool,
}

impl JsonExporter {
    /// Create a new JSON exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - Path to output file
    /// * `pretty` - Enable pretty-printing
    pub fn new(output_path: PathBuf, pretty: bool) -> Self {
        Self {
            output_path,
            pretty,
        }
    }
}

impl MetricsExporter for JsonExporter {
    fn export(&self, report: &ExperimentReport) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };

        write_output(&self.output_path, json.as_bytes())
    }
}

/// Prometheus exporter
pub struct PrometheusExporter {
    output_path: PathBuf,
}

impl PrometheusExporter {
    /// Create a new Prometheus exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - Path to output file
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }

    /// Convert a report to Prometheus text format
    fn to_prometheus_format(report: &ExperimentReport) -> String {
        let mut output = String::new();

        // Socket buffers
        output.push_str("# HELP queue_probe_receive_queue_bytes Receive queue depth at the last sample\n");
        output.push_str("# TYPE queue_probe_receive_queue_bytes gauge\n");
        for stats in report.sockets.values() {
            let _ = writeln!(
                output,
                "queue_probe_receive_queue_bytes{{transport=\"{}\",inode=\"{}\"}} {}",
                stats.transport, stats.inode, stats.receive_queue_depth
            );
        }
        output.push('\n');

        output.push_str("# HELP queue_probe_receive_queue_max_bytes Largest receive queue depth sampled\n");
        output.push_str("# TYPE queue_probe_receive_queue_max_bytes gauge\n");
        for stats in report.sockets.values() {
            let _ = writeln!(
                output,
                "queue_probe_receive_queue_max_bytes{{transport=\"{}\",inode=\"{}\"}} {}",
                stats.transport, stats.inode, stats.max_receive_queue_depth
            );
        }
        output.push('\n');

        output.push_str("# HELP queue_probe_socket_drops_total Kernel drop counter of the socket\n");
        output.push_str("# TYPE queue_probe_socket_drops_total counter\n");
        for stats in report.sockets.values() {
            let _ = writeln!(
                output,
                "queue_probe_socket_drops_total{{transport=\"{}\",inode=\"{}\"}} {}",
                stats.transport, stats.inode, stats.drops
            );
        }
        output.push('\n');

        // Softnet
        output.push_str("# HELP queue_probe_time_squeeze_total Times the receive softirq ran out of budget\n");
        output.push_str("# TYPE queue_probe_time_squeeze_total counter\n");
        for cpu in &report.cpus {
            let _ = writeln!(
                output,
                "queue_probe_time_squeeze_total{{cpu=\"{}\"}} {}",
                cpu.cpu, cpu.time_squeeze
            );
        }
        output.push('\n');

        // Latency
        output.push_str("# HELP queue_probe_latency_microseconds Transmit latency percentiles in microseconds\n");
        output.push_str("# TYPE queue_probe_latency_microseconds gauge\n");
        let percentiles = &report.latency.percentiles;
        for (quantile, value) in [
            ("0.5", percentiles.p50),
            ("0.9", percentiles.p90),
            ("0.99", percentiles.p99),
            ("0.999", percentiles.p999),
            ("0.9999", percentiles.p9999),
        ] {
            let _ = writeln!(
                output,
                "queue_probe_latency_microseconds{{quantile=\"{}\"}} {}",
                quantile, value
            );
        }
        output.push('\n');

        output.push_str("# HELP queue_probe_latency_histogram_microseconds Transmit latency distribution\n");
        output.push_str("# TYPE queue_probe_latency_histogram_microseconds histogram\n");
        for (bound, count) in report.latency.histogram.cumulative() {
            let le = bound.map_or_else(|| "+Inf".to_string(), |bound| bound.to_string());
            let _ = writeln!(
                output,
                "queue_probe_latency_histogram_microseconds_bucket{{le=\"{}\"}} {}",
                le, count
            );
        }
        let _ = writeln!(
            output,
            "queue_probe_latency_histogram_microseconds_sum {}",
            report.latency.histogram.sum_us
        );
        let _ = writeln!(
            output,
            "queue_probe_latency_histogram_microseconds_count {}",
            report.latency.histogram.total_count()
        );
        output.push('\n');

        output.push_str("# HELP queue_probe_messages_total Workload datagrams by direction\n");
        output.push_str("# TYPE queue_probe_messages_total counter\n");
        let _ = writeln!(output, "queue_probe_messages_total{{direction=\"sent\"}} {}", report.workload.sent);
        let _ = writeln!(
            output,
            "queue_probe_messages_total{{direction=\"received\"}} {}",
            report.workload.received
        );
        output.push('\n');

        output.push_str("# HELP queue_probe_failed_samples_total Monitor samples that failed\n");
        output.push_str("# TYPE queue_probe_failed_samples_total counter\n");
        let _ = writeln!(output, "queue_probe_failed_samples_total {}", report.ticks.failed_samples);

        output
    }
}

impl MetricsExporter for PrometheusExporter {
    fn export(&self, report: &ExperimentReport) -> Result<()> {
        let prometheus_data = Self::to_prometheus_format(report);
        write_output(&self.output_path, prometheus_data.as_bytes())
    }
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;

    file.write_all(data)
        .with_context(|| format!("Failed to write to output file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn create_test_report() -> ExperimentReport {
        let mut report = ExperimentReport {
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            duration_seconds: 60,
            ..ExperimentReport::default()
        };
        report.sockets.insert(
            "7f0000011f900000/16107".to_string(),
            SocketBufferStats {
                transport: "7f0000011f900000".to_string(),
                inode: 16_107,
                samples: 60,
                receive_queue_depth: 768,
                max_receive_queue_depth: 4096,
                drops: 12,
                drops_during_run: 12,
            },
        );
        report.cpus.push(CpuSqueezeStats {
            cpu: 3,
            samples: 60,
            time_squeeze: 7,
            time_squeeze_during_run: 2,
        });
        report.latency.percentiles.p99 = 250.0;
        for latency_us in [12.0, 30.0, 400.0] {
            report.latency.histogram.add_sample(latency_us);
        }
        report
    }

    #[test]
    fn test_prometheus_format() {
        let report = create_test_report();
        let prometheus = PrometheusExporter::to_prometheus_format(&report);

        assert!(prometheus
            .contains("queue_probe_receive_queue_bytes{transport=\"7f0000011f900000\",inode=\"16107\"} 768"));
        assert!(prometheus.contains("queue_probe_socket_drops_total{transport=\"7f0000011f900000\",inode=\"16107\"} 12"));
        assert!(prometheus.contains("queue_probe_time_squeeze_total{cpu=\"3\"} 7"));
        assert!(prometheus.contains("queue_probe_latency_microseconds{quantile=\"0.99\"} 250"));
        assert!(prometheus.contains("queue_probe_latency_histogram_microseconds_bucket{le=\"25\"} 1"));
        assert!(prometheus.contains("queue_probe_latency_histogram_microseconds_bucket{le=\"+Inf\"} 3"));
        assert!(prometheus.contains("queue_probe_latency_histogram_microseconds_sum 442\n"));
        assert!(prometheus.contains("queue_probe_latency_histogram_microseconds_count 3\n"));
    }

    #[test]
    fn test_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        JsonExporter::new(path.clone(), false)
            .export(&create_test_report())
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["duration_seconds"], 60);
        assert_eq!(value["sockets"]["7f0000011f900000/16107"]["max_receive_queue_depth"], 4096);
        assert_eq!(value["cpus"][0]["time_squeeze"], 7);
    }

    #[test]
    fn test_exporter_type_names() {
        assert_eq!(ExporterType::from_name("JSON"), Some(ExporterType::Json));
        assert_eq!(ExporterType::from_name("prom"), Some(ExporterType::Prometheus));
        assert_eq!(ExporterType::from_name("influx"), None);
    }
}
