//! `config`: print the effective configuration.

use anyhow::Result;
use racing_telemetry_core::CaptureConfig;

use crate::error::CliError;
use crate::output;

pub fn execute(config: &CaptureConfig) -> Result<()> {
    let redacted = config.redacted();
    print!("{}", redacted.to_yaml_string().map_err(CliError::from)?);

    if let Err(error) = config.validate() {
        output::print_warning(&format!("configuration will not start a capture: {error}"));
    }
    Ok(())
}
