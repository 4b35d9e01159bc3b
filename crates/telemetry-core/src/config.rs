//! Capture configuration.
//!
//! The core consumes a validated snapshot at start and never writes it back.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

pub const MIN_SAMPLE_RATE_HZ: u32 = 1;
pub const MAX_SAMPLE_RATE_HZ: u32 = 120;
pub const MIN_BUFFER_SIZE: usize = 1;
pub const MAX_BUFFER_SIZE: usize = 100_000;

pub const DEFAULT_ENDPOINT_URL: &str = "wss://myracingdata.com/api/v1/ws";
pub const DEFAULT_API_URL: &str = "https://myracingdata.com/api/v1";
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 60;
pub const DEFAULT_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_STALE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_ACC_PORT: u16 = 9232;

/// Complete capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Websocket endpoint of the collector
    pub endpoint_url: String,
    /// REST base URL used for the session handshake
    pub api_url: String,
    /// API key sent with every connection
    pub credential: String,
    /// Sampling cadence in Hz
    pub sample_rate_hz: u32,
    /// Capacity of the sampler-to-network queue
    pub buffer_size: usize,
    /// Bound on each websocket establishment
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
    pub session: SessionConfig,
    pub sources: SourceConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            credential: String::new(),
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout_ms: 5000,
            reconnect: ReconnectPolicy::default(),
            session: SessionConfig::default(),
            sources: SourceConfig::default(),
        }
    }
}

/// Reconnect budget and backoff shape.
///
/// The delay before attempt `n` (1-based) is `min(base_delay_ms * n, max_delay_ms)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff before reconnect attempt `attempt`. Attempt 0 has no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self
            .base_delay_ms
            .saturating_mul(u64::from(attempt))
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Optional begin/end exchange with the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Request a session id before streaming
    pub handshake: bool,
    pub begin_timeout_ms: u64,
    /// Bound on the best-effort end notification during stop
    pub end_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake: false,
            begin_timeout_ms: 5000,
            end_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn begin_timeout(&self) -> Duration {
        Duration::from_millis(self.begin_timeout_ms)
    }

    pub fn end_timeout(&self) -> Duration {
        Duration::from_millis(self.end_timeout_ms)
    }
}

/// Per-title transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// A source that publishes nothing new for this long is treated as lost
    pub stale_timeout_ms: u64,
    pub acc: AccConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            stale_timeout_ms: DEFAULT_STALE_TIMEOUT_MS,
            acc: AccConfig::default(),
        }
    }
}

impl SourceConfig {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }
}

/// ACC broadcasting registration parameters (see `broadcasting.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccConfig {
    pub host: IpAddr,
    pub port: u16,
    pub connection_password: String,
    pub command_password: String,
    pub display_name: String,
    /// Realtime update interval requested from the game
    pub update_interval_ms: u32,
}

impl Default for AccConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_ACC_PORT,
            connection_password: String::new(),
            command_password: String::new(),
            display_name: "racing-telemetry".to_string(),
            update_interval_ms: 16,
        }
    }
}

impl AccConfig {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl CaptureConfig {
    /// Parse YAML supplied by a collaborator. Missing keys take defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Copy with the credential masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.credential.is_empty() {
            copy.credential = "********".to_string();
        }
        copy
    }

    pub fn sample_period(&self) -> Duration {
        let hz = self.sample_rate_hz.max(MIN_SAMPLE_RATE_HZ);
        Duration::from_nanos(1_000_000_000 / u64::from(hz))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate the snapshot. `start` refuses to run on any error here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credential.trim().is_empty() {
            return Err(ConfigError::MissingCredential);
        }

        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        let endpoint =
            Url::parse(self.endpoint_url.trim()).map_err(|e| ConfigError::InvalidEndpoint {
                url: self.endpoint_url.clone(),
                reason: e.to_string(),
            })?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidEndpoint {
                url: self.endpoint_url.clone(),
                reason: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }

        if self.session.handshake {
            let api = Url::parse(self.api_url.trim()).map_err(|e| ConfigError::InvalidEndpoint {
                url: self.api_url.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(api.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidEndpoint {
                    url: self.api_url.clone(),
                    reason: format!("unsupported scheme '{}'", api.scheme()),
                });
            }
        }

        if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&self.sample_rate_hz) {
            return Err(ConfigError::SampleRateOutOfRange {
                hz: self.sample_rate_hz,
                min: MIN_SAMPLE_RATE_HZ,
                max: MAX_SAMPLE_RATE_HZ,
            });
        }

        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(ConfigError::BufferSizeOutOfRange {
                size: self.buffer_size,
                min: MIN_BUFFER_SIZE,
                max: MAX_BUFFER_SIZE,
            });
        }

        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::InvalidReconnectPolicy {
                reason: "max_attempts must be at least 1".to_string(),
            });
        }

        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::InvalidReconnectPolicy {
                reason: format!(
                    "base_delay_ms {} exceeds max_delay_ms {}",
                    self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn valid() -> CaptureConfig {
        CaptureConfig {
            credential: "key-123".to_string(),
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn test_defaults_match_collector() -> TestResult {
        let config = CaptureConfig::default();
        assert_eq!(config.endpoint_url, "wss://myracingdata.com/api/v1/ws");
        assert_eq!(config.api_url, "https://myracingdata.com/api/v1");
        assert_eq!(config.sample_rate_hz, 60);
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.sources.acc.port, 9232);
        Ok(())
    }

    #[test]
    fn test_missing_credential_is_rejected() -> TestResult {
        let config = CaptureConfig::default();
        assert_eq!(config.validate(), Err(ConfigError::MissingCredential));
        Ok(())
    }

    #[test]
    fn test_endpoint_validation() -> TestResult {
        let mut config = valid();
        config.endpoint_url = String::new();
        assert_eq!(config.validate(), Err(ConfigError::MissingEndpoint));

        config.endpoint_url = "https://example.com/ws".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        config.endpoint_url = "ws://127.0.0.1:9000/ws".to_string();
        assert_eq!(config.validate(), Ok(()));
        Ok(())
    }

    #[test]
    fn test_sample_rate_bounds() -> TestResult {
        let mut config = valid();
        config.sample_rate_hz = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SampleRateOutOfRange { hz: 0, .. })
        ));
        config.sample_rate_hz = 121;
        assert!(config.validate().is_err());
        config.sample_rate_hz = 120;
        assert_eq!(config.validate(), Ok(()));
        Ok(())
    }

    #[test]
    fn test_buffer_and_reconnect_bounds() -> TestResult {
        let mut config = valid();
        config.buffer_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BufferSizeOutOfRange { .. })
        ));

        let mut config = valid();
        config.reconnect.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidReconnectPolicy { .. })
        ));

        let mut config = valid();
        config.reconnect.base_delay_ms = 60_000;
        assert!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_sample_period() -> TestResult {
        let mut config = valid();
        config.sample_rate_hz = 50;
        assert_eq!(config.sample_period(), Duration::from_millis(20));
        Ok(())
    }

    #[test]
    fn test_yaml_partial_document_uses_defaults() -> TestResult {
        let config = CaptureConfig::from_yaml_str(
            "credential: abc\nsample_rate_hz: 30\nsources:\n  acc:\n    port: 9000\n",
        )?;
        assert_eq!(config.credential, "abc");
        assert_eq!(config.sample_rate_hz, 30);
        assert_eq!(config.sources.acc.port, 9000);
        assert_eq!(config.sources.acc.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        Ok(())
    }

    #[test]
    fn test_redacted_hides_credential() -> TestResult {
        let yaml = valid().redacted().to_yaml_string()?;
        assert!(!yaml.contains("key-123"));
        Ok(())
    }

    #[test]
    fn test_linear_backoff_is_capped() -> TestResult {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            base_delay_ms: 2000,
            max_delay_ms: 7000,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(6));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(7));
        assert!(policy.is_exhausted(10));
        assert!(!policy.is_exhausted(9));
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_backoff_is_non_decreasing(base in 0u64..100_000, max in 0u64..1_000_000, attempt in 0u32..1000) {
            let policy = ReconnectPolicy { max_attempts: 10, base_delay_ms: base, max_delay_ms: max };
            let current = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt.saturating_add(1));
            prop_assert!(next >= current);
            prop_assert!(next <= Duration::from_millis(max));
        }
    }
}
