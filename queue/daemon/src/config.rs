//! Experiment configuration
//!
//! Defaults suit a local loopback run against the host's `/proc`. A JSON
//! file may override any subset of fields; command-line flags are applied
//! on top by the binary.

use crate::{softnet::SoftnetLayout, udp_table::UdpTableLayout};
use anyhow::{ensure, Context, Result};
use queue_probe_common::constants::{DEFAULT_PROC_ROOT, MESSAGE_HEADER_LEN};
use serde::{Deserialize, Serialize};
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

/// Runtime settings for one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Address the receiver binds and the buffer-depth monitor watches
    pub address: SocketAddr,
    /// Run duration in seconds (0 = until interrupted)
    pub duration_secs: u64,
    /// Period between monitor samples in milliseconds
    pub sample_interval_ms: u64,
    /// Grace period for workers to exit in milliseconds
    pub shutdown_grace_ms: u64,
    /// Pause between sent datagrams in microseconds
    pub send_interval_us: u64,
    /// Datagram size in bytes
    pub message_size: usize,
    /// Proc filesystem root
    pub proc_root: PathBuf,
    /// Socket table column layout
    pub udp_table: UdpTableLayout,
    /// Softnet table column layout
    pub softnet: SoftnetLayout,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from((Ipv4Addr::LOCALHOST, 14_567)),
            duration_secs: 60,
            sample_interval_ms: 1_000,
            shutdown_grace_ms: 10_000,
            send_interval_us: 1_000,
            message_size: 256,
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            udp_table: UdpTableLayout::default(),
            softnet: SoftnetLayout::default(),
        }
    }
}

impl ExperimentConfig {
    /// Load a configuration file, filling unset fields with defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&data).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Reject settings the experiment cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.sample_interval_ms > 0, "Sample interval must be >= 1ms");
        ensure!(
            self.message_size >= MESSAGE_HEADER_LEN,
            "Message size must be >= {} bytes",
            MESSAGE_HEADER_LEN
        );
        self.udp_table.validate()?;
        self.softnet.validate()?;
        Ok(())
    }

    /// Run duration, `None` to run until interrupted
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_micros(self.send_interval_us)
    }
}
