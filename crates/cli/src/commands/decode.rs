//! `decode`: turn captured buffers into a canonical record.
//!
//! AC takes two dumps (physics page, then graphics page) and LMU takes one
//! telemetry block. ACC takes any number of broadcast packets, one per file,
//! applied in order; the record is built from the last player-car update.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use racing_telemetry_adapters::acc::{AccSessionState, parse_inbound_message};
use racing_telemetry_adapters::{TitleSample, ac, lmu, normalize};
use racing_telemetry_core::{RecordTimestamp, TelemetryRecord};
use tracing::debug;

use crate::error::CliError;
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecodeTitle {
    Ac,
    Acc,
    Lmu,
}

pub fn execute(title: DecodeTitle, files: &[PathBuf]) -> Result<()> {
    let record = decode_files(title, files)?;
    output::print_record(&record);
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn decode_files(title: DecodeTitle, files: &[PathBuf]) -> Result<TelemetryRecord> {
    let sample = match title {
        DecodeTitle::Ac => {
            let [physics, graphics] = files else {
                return Err(CliError::InputCount {
                    title: "ac",
                    expected: "2 (physics, graphics)",
                    actual: files.len(),
                }
                .into());
            };
            let frame = ac::decode_frame(&read(physics)?, &read(graphics)?)
                .map_err(CliError::from)?;
            TitleSample::Ac(Box::new(frame))
        }
        DecodeTitle::Lmu => {
            let [block] = files else {
                return Err(CliError::InputCount {
                    title: "lmu",
                    expected: "1",
                    actual: files.len(),
                }
                .into());
            };
            let telemetry = lmu::decode(&read(block)?).map_err(CliError::from)?;
            TitleSample::Lmu(Box::new(telemetry))
        }
        DecodeTitle::Acc => {
            if files.is_empty() {
                return Err(CliError::InputCount {
                    title: "acc",
                    expected: "at least 1",
                    actual: 0,
                }
                .into());
            }
            let mut state = AccSessionState::default();
            for path in files {
                let message = parse_inbound_message(&read(path)?)
                    .map_err(CliError::from)
                    .with_context(|| format!("Failed to decode {}", path.display()))?;
                debug!(file = %path.display(), "Applied broadcast packet");
                state.apply(message);
            }
            let snapshot = state.latest().cloned().ok_or(CliError::NoPlayerCar)?;
            TitleSample::Acc(Box::new(snapshot))
        }
    };

    Ok(normalize(&sample, RecordTimestamp::now()))
}
