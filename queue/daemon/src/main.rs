//! UDP Queue Probe - Userspace Program
//!
//! Runs a synthetic UDP workload, samples kernel receive-buffer depth and
//! softirq time squeezes alongside it, and exports a summary report.
//!
//! ## Usage
//!
//! ```bash
//! # Run for 60 seconds against 127.0.0.1:14567 and export to JSON
//! ./queue-probe --duration 60 --output queue-report.json
//!
//! # Send every 100μs and sample every 250ms
//! ./queue-probe --send-interval-us 100 --sample-interval-ms 250
//!
//! # Load settings (including table layouts) from a file
//! ./queue-probe --config probe.json
//!
//! # Export to Prometheus format
//! ./queue-probe --format prometheus --output queue-report.prom
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use queue_probe_daemon::{
    config::ExperimentConfig,
    experiment::{Experiment, ShutdownOutcome},
    exporter::{ExporterType, JsonExporter, MetricsExporter, PrometheusExporter},
    types::ExperimentReport,
    workload::FixedInterval,
};
use std::{net::SocketAddr, path::PathBuf};

/// UDP receive-buffer and softirq probe
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Address the receiver binds and the monitor watches [default: 127.0.0.1:14567]
    #[clap(short, long)]
    address: Option<SocketAddr>,

    /// Duration to run (in seconds, 0 = until Ctrl-C) [default: 60]
    #[clap(short, long)]
    duration: Option<u64>,

    /// Period between kernel samples in milliseconds [default: 1000]
    #[clap(long)]
    sample_interval_ms: Option<u64>,

    /// Grace period for workers to exit in milliseconds [default: 10000]
    #[clap(long)]
    shutdown_grace_ms: Option<u64>,

    /// Pause between sent datagrams in microseconds [default: 1000]
    #[clap(long)]
    send_interval_us: Option<u64>,

    /// Datagram size in bytes [default: 256]
    #[clap(long)]
    message_size: Option<usize>,

    /// Proc filesystem root [default: /proc]
    #[clap(long)]
    proc_root: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Output file for the report
    #[clap(short, long, default_value = "queue-report.json")]
    output: PathBuf,

    /// Output format (json, prometheus)
    #[clap(short, long, default_value = "json")]
    format: String,

    /// Verbose logging
    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_file(path)?,
            None => ExperimentConfig::default(),
        };

        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(duration) = self.duration {
            config.duration_secs = duration;
        }
        if let Some(interval) = self.sample_interval_ms {
            config.sample_interval_ms = interval;
        }
        if let Some(grace) = self.shutdown_grace_ms {
            config.shutdown_grace_ms = grace;
        }
        if let Some(interval) = self.send_interval_us {
            config.send_interval_us = interval;
        }
        if let Some(size) = self.message_size {
            config.message_size = size;
        }
        if let Some(root) = self.proc_root {
            config.proc_root = root;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    print_banner();

    // Parse export format
    let export_format = match ExporterType::from_name(&args.format) {
        Some(format) => format,
        None => anyhow::bail!("Unsupported format: {}. Use json or prometheus", args.format),
    };
    let output = args.output.clone();
    let config = args.into_config()?;

    info!("Starting UDP queue probe...");
    info!("   Address: {}", config.address);
    info!(
        "   Duration: {} seconds",
        match config.duration() {
            Some(duration) => duration.as_secs().to_string(),
            None => "infinite".to_string(),
        }
    );
    info!("   Sample interval: {:?}", config.sample_interval());
    info!("   Send interval: {:?}", config.send_interval());
    info!("   Proc root: {:?}", config.proc_root);
    info!("   Output: {:?}", output);

    let delay = FixedInterval(config.send_interval());
    let outcome = Experiment::new(config, delay).execute().await?;

    if let ShutdownOutcome::TimedOut { aborted } = outcome.shutdown {
        eprintln!("Failed to shut down workers, {} task(s) did not exit.", aborted);
    }

    info!("Generating report...");

    match export_format {
        ExporterType::Json => JsonExporter::new(output.clone(), true).export(&outcome.report)?,
        ExporterType::Prometheus => PrometheusExporter::new(output.clone()).export(&outcome.report)?,
    }

    info!("Report written to {:?}", output);

    print_summary(&outcome.report);

    Ok(())
}

fn print_banner() {
    println!(
        r#"
╔═══════════════════════════════════════════════════╗
║        UDP Queue Probe - Kernel Buffers           ║
║          and Softirq Time Squeeze                 ║
╚═══════════════════════════════════════════════════╝
    "#
    );
}

fn print_summary(report: &ExperimentReport) {
    info!("");
    info!("============================================");
    info!("             Summary Report");
    info!("============================================");
    info!("");
    info!("  Duration:           {} seconds", report.duration_seconds);
    info!("  Messages sent:      {}", report.workload.sent);
    info!("  Messages received:  {}", report.workload.received);
    info!("  Samples:            {} ({} failed)", report.ticks.ticks, report.ticks.failed_samples);
    info!("");
    info!("  Latency Percentiles (μs):");
    info!("    p50:   {:>10.2}", report.latency.percentiles.p50);
    info!("    p90:   {:>10.2}", report.latency.percentiles.p90);
    info!("    p99:   {:>10.2}", report.latency.percentiles.p99);
    info!("    p999:  {:>10.2}", report.latency.percentiles.p999);
    info!("    p9999: {:>10.2}", report.latency.percentiles.p9999);
    info!("");
    info!("  Socket Buffers:");
    for (instance, stats) in &report.sockets {
        info!(
            "    {}: depth max {:>8}, drops during run {:>8}",
            instance, stats.max_receive_queue_depth, stats.drops_during_run
        );
    }
    info!("");
    info!("  Time Squeeze (during run):");
    for cpu in &report.cpus {
        info!("    cpu{:<3} {:>8}", cpu.cpu, cpu.time_squeeze_during_run);
    }
    info!("");
    info!("============================================");
}
