//! Error taxonomy for the capture core.
//!
//! Decode and probe failures are handled where they occur and retried on the
//! next tick. Source loss and streaming failures surface through status. Only
//! configuration errors are returned from `start`.

use thiserror::Error;

use crate::source::SourceTitle;

/// Malformed or undersized telemetry input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer shorter than the title layout. A torn or partial shared-memory
    /// read lands here.
    #[error("{layout} buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Cursor read past the end of a variable-length event payload.
    #[error("{layout} payload truncated: need {needed} bytes at offset {offset}, total {total}")]
    Truncated {
        layout: &'static str,
        offset: usize,
        needed: usize,
        total: usize,
    },

    #[error("unknown {layout} message type {message_type}")]
    UnknownMessage {
        layout: &'static str,
        message_type: u8,
    },

    #[error("invalid {layout} text field: {reason}")]
    InvalidText {
        layout: &'static str,
        reason: String,
    },
}

/// Adapter-level failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Probe failed. Expected whenever the title is not running.
    #[error("{title} is not available: {reason}")]
    Unavailable { title: SourceTitle, reason: String },

    /// A previously active source stopped responding.
    #[error("{title} stopped responding: {reason}")]
    Lost { title: SourceTitle, reason: String },

    #[error("{title} decode failed: {source}")]
    Decode {
        title: SourceTitle,
        #[source]
        source: DecodeError,
    },
}

impl SourceError {
    pub fn lost(title: SourceTitle, reason: impl Into<String>) -> Self {
        SourceError::Lost {
            title,
            reason: reason.into(),
        }
    }

    pub fn unavailable(title: SourceTitle, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            title,
            reason: reason.into(),
        }
    }

    /// Whether the active source must be dropped.
    pub fn is_source_lost(&self) -> bool {
        matches!(
            self,
            SourceError::Lost { .. } | SourceError::Unavailable { .. }
        )
    }
}

/// Network-layer failures of the streaming client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamingError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("send failed: {0}")]
    Send(String),

    #[error("session request failed: {0}")]
    Session(String),

    #[error("connect timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Reconnect budget exhausted; the client stopped retrying.
    #[error("streaming failed after {attempts} reconnect attempts")]
    StreamingFailed { attempts: u32 },
}

/// Invalid capture configuration. Fatal to `start`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("credential is missing")]
    MissingCredential,

    #[error("endpoint URL is missing")]
    MissingEndpoint,

    #[error("invalid endpoint URL {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("sample rate {hz} Hz is outside {min}..={max} Hz")]
    SampleRateOutOfRange { hz: u32, min: u32, max: u32 },

    #[error("buffer size {size} is outside {min}..={max}")]
    BufferSizeOutOfRange { size: usize, min: usize, max: usize },

    #[error("invalid reconnect policy: {reason}")]
    InvalidReconnectPolicy { reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Returned synchronously from `start`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("capture is already running")]
    AlreadyRunning,

    /// The streaming side could not be set up (e.g. no TLS backend).
    #[error(transparent)]
    Streaming(#[from] StreamingError),
}

/// Normalizer rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("out-of-order sample: {current_ns}ns is not after {previous_ns}ns")]
    OutOfOrder { previous_ns: u64, current_ns: u64 },
}
