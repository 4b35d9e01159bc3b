//! Canonical telemetry record and shared state for the capture core.
//!
//! ## Modules
//! - `record` - `TelemetryRecord`, the single schema every title maps into
//! - `source` - supported titles and session classification
//! - `units` - unit conversions and sanitizers
//! - `config` - capture configuration snapshot and validation
//! - `connection` - streaming session state, reconnect and staleness tracking
//! - `error` - error taxonomy shared by every crate in the workspace

#![deny(static_mut_refs)]

use std::time::Instant;

pub mod config;
pub mod connection;
pub mod error;
pub mod record;
pub mod source;
pub mod units;

pub use config::{AccConfig, CaptureConfig, ReconnectPolicy, SessionConfig, SourceConfig};
pub use connection::{ConnectionState, ReconnectTracker, SessionSnapshot, StalenessTracker};
pub use error::{
    ConfigError, DecodeError, NormalizeError, SourceError, StartError, StreamingError,
};
pub use record::{
    Environment, LapInfo, MotionState, Orientation, Powertrain, RecordTimestamp,
    TelemetryRecord, TelemetryValue, Vec3, WheelState,
};
pub use source::{SessionType, SourceTitle};

/// Nanoseconds since the first call in this process, on a monotonic clock.
pub fn telemetry_now_ns() -> u64 {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    Instant::now()
        .checked_duration_since(*epoch)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .min(u64::MAX as u128) as u64
}
