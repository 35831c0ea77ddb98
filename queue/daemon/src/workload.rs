//! Synthetic UDP workload
//!
//! A sender paces datagrams at the target address and a receiver turns each
//! one back into a transmit latency. Both run until the shutdown signal
//! flips. Datagrams carry:
//!
//! ```text
//! | sequence (u64 LE) | send time, ns since epoch (u64 LE) | zero padding |
//! ```

use crate::types::WorkloadStats;
use log::{debug, info, warn};
use queue_probe_common::constants::MESSAGE_HEADER_LEN;
use std::time::Duration;
use tokio::{
    net::UdpSocket,
    sync::watch,
    time::{sleep, Instant},
};

/// Largest datagram the receiver accepts
const MAX_DATAGRAM: usize = 64 * 1024;

/// Decides how long the sender pauses after each datagram
pub trait SendDelay: Send {
    fn next_delay(&mut self, sequence: u64) -> Duration;
}

/// Constant pause between datagrams
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval(pub Duration);

impl SendDelay for FixedInterval {
    fn next_delay(&mut self, _sequence: u64) -> Duration {
        self.0
    }
}

/// Receives one latency per received datagram
pub trait LatencyHandler: Send {
    fn on_latency(&mut self, nanos: u64);
}

impl LatencyHandler for Vec<u64> {
    fn on_latency(&mut self, nanos: u64) {
        self.push(nanos);
    }
}

/// Encodes and decodes workload datagrams against a shared epoch
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    epoch: Instant,
    size: usize,
}

impl MessageCodec {
    /// `size` is raised to the header length if smaller
    pub fn new(epoch: Instant, size: usize) -> Self {
        Self {
            epoch,
            size: size.max(MESSAGE_HEADER_LEN),
        }
    }

    /// Datagram size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Nanoseconds since the epoch
    pub fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Write the header for `sequence` stamped with the current time
    pub fn encode(&self, sequence: u64, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&sequence.to_le_bytes());
        buf[8..MESSAGE_HEADER_LEN].copy_from_slice(&self.now().to_le_bytes());
    }

    /// Sequence and send time, or `None` for an undersized datagram
    pub fn decode(&self, datagram: &[u8]) -> Option<(u64, u64)> {
        let header = datagram.get(..MESSAGE_HEADER_LEN)?;
        let (sequence, sent) = header.split_at(8);
        Some((
            u64::from_le_bytes(sequence.try_into().ok()?),
            u64::from_le_bytes(sent.try_into().ok()?),
        ))
    }
}

/// Send datagrams on a connected socket until shutdown
pub async fn send_loop<D: SendDelay>(
    socket: UdpSocket,
    codec: MessageCodec,
    mut delay: D,
    mut shutdown: watch::Receiver<bool>,
) -> WorkloadStats {
    let mut stats = WorkloadStats::default();
    let mut buf = vec![0u8; codec.size()];
    let mut sequence = 0u64;

    while !*shutdown.borrow() {
        codec.encode(sequence, &mut buf);
        match socket.send(&buf).await {
            Ok(_) => stats.sent += 1,
            Err(e) => {
                // Loopback reports ECONNREFUSED while the receiver is away
                stats.send_errors += 1;
                debug!("Send of message {} failed: {}", sequence, e);
            }
        }

        let pause = delay.next_delay(sequence);
        sequence += 1;
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(pause) => {}
        }
    }

    info!("Sender stopped after {} messages", stats.sent);
    stats
}

/// Receive datagrams and report their latency until shutdown
pub async fn receive_loop<H: LatencyHandler>(
    socket: UdpSocket,
    codec: MessageCodec,
    mut handler: H,
    mut shutdown: watch::Receiver<bool>,
) -> WorkloadStats {
    let mut stats = WorkloadStats::default();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv(&mut buf) => match received {
                Ok(len) => match codec.decode(&buf[..len]) {
                    Some((_, sent)) => {
                        stats.received += 1;
                        handler.on_latency(codec.now().saturating_sub(sent));
                    }
                    None => stats.undersized += 1,
                },
                Err(e) => {
                    stats.receive_errors += 1;
                    warn!("Receive failed: {}", e);
                }
            },
        }
    }

    info!("Receiver stopped after {} messages", stats.received);
    stats
}
