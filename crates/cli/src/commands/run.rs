//! `run`: capture until Ctrl-C.

use std::time::Duration;

use anyhow::{Context, Result};
use racing_telemetry_capture::CaptureController;
use racing_telemetry_core::CaptureConfig;
use tracing::{info, warn};

use crate::error::CliError;
use crate::output;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

pub async fn execute(config: CaptureConfig, json: bool) -> Result<()> {
    let mut controller = CaptureController::new();
    controller.start(config).map_err(CliError::from)?;
    info!("Capture started; press Ctrl-C to stop");

    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    // The first tick completes immediately.
    ticker.tick().await;

    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                break signal.context("Failed to listen for Ctrl-C");
            }
            _ = ticker.tick() => {
                let status = controller.status();
                output::print_status(&status, json);
                if !status.running {
                    warn!("Sampling loop ended on its own");
                    break Ok(());
                }
            }
        }
    };

    info!("Stopping capture");
    controller.stop().await;
    output::print_status(&controller.status(), json);
    outcome
}
