//! Error types for telemetryctl

use racing_telemetry_core::{ConfigError, DecodeError, StartError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("Capture could not start: {0}")]
    StartFailed(#[from] StartError),

    #[error("Decode failed: {0}")]
    DecodeFailed(#[from] DecodeError),

    #[error("Wrong number of input files for {title}: expected {expected}, got {actual}")]
    InputCount {
        title: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("No player car update found in the ACC capture")]
    NoPlayerCar,

    #[error("No telemetry source is running")]
    NoSource,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::NoSource => 2,
            CliError::InvalidConfiguration(_) => 3,
            CliError::StartFailed(StartError::Config(_)) => 3,
            CliError::DecodeFailed(_) | CliError::InputCount { .. } | CliError::NoPlayerCar => 4,
            CliError::StartFailed(_) => 5,
            CliError::IoError(_) | CliError::JsonError(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_group_by_cause() {
        assert_eq!(CliError::NoSource.exit_code(), 2);
        assert_eq!(
            CliError::InvalidConfiguration(ConfigError::MissingCredential).exit_code(),
            3
        );
        assert_eq!(
            CliError::StartFailed(StartError::Config(ConfigError::MissingEndpoint)).exit_code(),
            3
        );
        assert_eq!(CliError::StartFailed(StartError::AlreadyRunning).exit_code(), 5);
        assert_eq!(CliError::NoPlayerCar.exit_code(), 4);
    }
}
