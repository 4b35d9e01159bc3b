//! Effective configuration: YAML file first, then command-line overrides.

use std::path::Path;

use anyhow::{Context, Result};
use racing_telemetry_core::CaptureConfig;

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub rate: Option<u32>,
}

impl Overrides {
    pub fn apply(&self, config: &mut CaptureConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint_url.clone_from(endpoint);
        }
        if let Some(api_key) = &self.api_key {
            config.credential.clone_from(api_key);
        }
        if let Some(rate) = self.rate {
            config.sample_rate_hz = rate;
        }
    }
}

/// Load `path` when given, otherwise start from defaults. Not validated here;
/// `start` validates before anything runs.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<CaptureConfig> {
    let mut config = match path {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            CaptureConfig::from_yaml_str(&yaml)
                .map_err(crate::error::CliError::from)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => CaptureConfig::default(),
    };
    overrides.apply(&mut config);
    Ok(config)
}
