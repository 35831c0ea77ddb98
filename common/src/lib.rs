//! Shared types for the UDP queue probe
//!
//! This crate provides the socket identity model, the report values handed
//! to sinks, and the pseudo-file constants shared by the monitors.

#![no_std]

pub mod constants;
pub mod identity;
pub mod types;

// Re-export commonly used types
pub use identity::{SocketIdentifier, SocketInstanceId};
pub use types::{BufferDepthReport, TimeSqueezeReport};
