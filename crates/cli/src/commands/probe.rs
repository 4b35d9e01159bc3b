//! `probe`: one detection pass over every supported title.

use std::sync::Arc;

use anyhow::Result;
use racing_telemetry_adapters::OsRegionProvider;
use racing_telemetry_capture::probe_sources;
use racing_telemetry_core::CaptureConfig;

use crate::error::CliError;
use crate::output;

pub async fn execute(config: &CaptureConfig, json: bool) -> Result<()> {
    let found = probe_sources(&config.sources, Arc::new(OsRegionProvider)).await;
    let title = found.ok_or(CliError::NoSource)?;
    output::print_probe_result(title, json);
    Ok(())
}
