//! telemetryctl - racing simulator telemetry capture CLI
//!
//! Runs a capture against the configured collector, probes for a running
//! title, and decodes captured buffers offline.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::DecodeTitle;
use crate::error::CliError;
use crate::settings::Overrides;

#[derive(Parser)]
#[command(name = "telemetryctl")]
#[command(about = "Capture, probe and decode racing simulator telemetry")]
#[command(version)]
#[command(long_about = "
telemetryctl streams live telemetry from Assetto Corsa, Assetto Corsa
Competizione or Le Mans Ultimate to a remote collector. Whichever title is
running is detected automatically and the stream follows it when the driver
switches titles.

Use --json for machine-readable status output suitable for scripting.
")]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// YAML configuration file; defaults apply when omitted
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Collector websocket endpoint (overrides the config file)
    #[arg(long, global = true, value_name = "URL")]
    endpoint: Option<String>,

    /// Collector API key (overrides the config file)
    #[arg(
        long,
        global = true,
        env = "RACING_TELEMETRY_API_KEY",
        hide_env_values = true
    )]
    api_key: Option<String>,

    /// Sample rate in Hz (overrides the config file)
    #[arg(long, global = true, value_name = "HZ")]
    rate: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture and stream until Ctrl-C
    Run,

    /// Report which title is running, if any
    Probe,

    /// Decode captured buffers and print the record as JSON
    Decode {
        /// Title the buffers came from
        #[arg(long, value_enum)]
        title: DecodeTitle,

        /// Input files (AC: physics dump then graphics dump)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the effective configuration (credential redacted)
    Config,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            rate: self.rate,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("telemetryctl={log_level},racing_telemetry={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match execute_command(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Decode { title, files } => commands::decode::execute(*title, files),
        Commands::Run => {
            let config = settings::load(cli.config.as_deref(), &cli.overrides())?;
            commands::run::execute(config, cli.json).await
        }
        Commands::Probe => {
            let config = settings::load(cli.config.as_deref(), &cli.overrides())?;
            commands::probe::execute(&config, cli.json).await
        }
        Commands::Config => {
            let config = settings::load(cli.config.as_deref(), &cli.overrides())?;
            commands::config::execute(&config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_run_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["telemetryctl", "run"])?;
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
        assert!(cli.endpoint.is_none());
        assert!(cli.rate.is_none());
        assert!(matches!(cli.command, Commands::Run));
        Ok(())
    }

    #[test]
    fn parse_verbose_levels() -> TestResult {
        for (args, expected) in [
            (vec!["telemetryctl", "probe"], 0),
            (vec!["telemetryctl", "-v", "probe"], 1),
            (vec!["telemetryctl", "-vv", "probe"], 2),
            (vec!["telemetryctl", "probe", "-vvv"], 3),
        ] {
            let cli = Cli::try_parse_from(args)?;
            assert_eq!(cli.verbose, expected);
        }
        Ok(())
    }

    #[test]
    fn parse_overrides_after_subcommand() -> TestResult {
        let cli = Cli::try_parse_from([
            "telemetryctl",
            "run",
            "--config",
            "capture.yaml",
            "--endpoint",
            "ws://127.0.0.1:9000/ws",
            "--api-key",
            "secret",
            "--rate",
            "30",
        ])?;
        assert_eq!(cli.config, Some(PathBuf::from("capture.yaml")));
        let overrides = cli.overrides();
        assert_eq!(overrides.endpoint.as_deref(), Some("ws://127.0.0.1:9000/ws"));
        assert_eq!(overrides.api_key.as_deref(), Some("secret"));
        assert_eq!(overrides.rate, Some(30));
        Ok(())
    }

    #[test]
    fn parse_rate_must_be_numeric() {
        let result = Cli::try_parse_from(["telemetryctl", "run", "--rate", "fast"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_decode_ac_pair() -> TestResult {
        let cli = Cli::try_parse_from([
            "telemetryctl",
            "decode",
            "--title",
            "ac",
            "physics.bin",
            "graphics.bin",
        ])?;
        match &cli.command {
            Commands::Decode { title, files } => {
                assert_eq!(*title, DecodeTitle::Ac);
                assert_eq!(
                    files,
                    &vec![PathBuf::from("physics.bin"), PathBuf::from("graphics.bin")]
                );
            }
            _ => return Err("expected Decode command".into()),
        }
        Ok(())
    }

    #[test]
    fn parse_decode_requires_title_and_files() {
        assert!(Cli::try_parse_from(["telemetryctl", "decode", "x.bin"]).is_err());
        assert!(Cli::try_parse_from(["telemetryctl", "decode", "--title", "lmu"]).is_err());
        assert!(
            Cli::try_parse_from(["telemetryctl", "decode", "--title", "rf2", "x.bin"]).is_err()
        );
    }

    #[test]
    fn parse_unknown_subcommand_fails() {
        assert!(Cli::try_parse_from(["telemetryctl", "replay"]).is_err());
    }
}
