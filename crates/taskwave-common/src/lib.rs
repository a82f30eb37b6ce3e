//! # Taskwave Common
//!
//! Logging configuration and shared helpers for the Taskwave worker core.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Milliseconds since the Unix epoch.
///
/// Notification target times and cache timestamps are expressed in epoch
/// milliseconds, matching the wire protocol.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
