//! Output formatting for CLI responses

use anyhow::Error;
use colored::*;
use racing_telemetry_capture::CaptureStatus;
use racing_telemetry_core::{SourceTitle, TelemetryRecord};
use serde::Serialize;
use serde_json::json;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": format!("{error:#}"),
        }
    });
    print_json(&error_json);
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format output as JSON: {}", e),
    }
}

pub fn print_status(status: &CaptureStatus, json: bool) {
    if json {
        match serde_json::to_string(status) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Failed to format status as JSON: {}", e),
        }
        return;
    }

    let running = if status.running {
        "running".green()
    } else {
        "stopped".red()
    };
    let link = if status.streaming_failed {
        "failed".red().bold()
    } else if status.connected {
        "connected".green()
    } else {
        status.connection_state.as_str().yellow()
    };
    let source = status
        .active_source
        .map_or_else(|| "none".dimmed(), |title| title.as_str().bold());

    println!(
        "{} capture {}, source {}, link {}, sent {}, dropped {}, reconnects {}",
        "●".cyan(),
        running,
        source,
        link,
        status.records_sent,
        status.records_dropped,
        status.reconnect_attempts
    );
}

pub fn print_probe_result(title: SourceTitle, json: bool) {
    if json {
        print_json(&json!({
            "success": true,
            "source": title,
        }));
    } else {
        println!("{} {} is running", "✓".green(), title.as_str().bold());
    }
}

/// Records are always JSON; `--json` only affects status and error output.
pub fn print_record(record: &TelemetryRecord) {
    print_json(record);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), message);
}
