//! Report values delivered to sinks
//!
//! Reports are plain copies. A sink that keeps one past its callback owns
//! that copy; the monitors reuse their parse state on the next row.

use crate::identity::SocketInstanceId;

/// Receive-queue depth and drops of one owned socket instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferDepthReport {
    /// Socket instance (tuple overlaid with inode)
    pub instance: SocketInstanceId,
    /// Bytes queued for receipt
    pub receive_queue_depth: u64,
    /// Cumulative drops since the socket was created
    pub drops: u64,
}

/// Time-squeeze counter of one CPU
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSqueezeReport {
    /// Row position in the softnet table
    pub cpu: u32,
    /// Times the receive softirq ran out of budget
    pub time_squeeze: u64,
}
