//! CLI entry point for sensor_logger
//!
//! Runs the HTTP server or drives sessions directly against the data directory.
//! Every command shares the same state file, so `start`/`stop` from the command
//! line and requests to a running server agree on the active session.
//!
//! # Usage
//!
//! ```bash
//! sensor_logger serve --bind 0.0.0.0:8000
//! sensor_logger start
//! sensor_logger status
//! sensor_logger stop --output session.zip
//! sensor_logger archive 20240501_120000
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensor_logger::data::archive_file_name;
use sensor_logger::session::StopOutcome;
use sensor_logger::{tracing_setup, LoggerConfig, LoggerError, LoggerService};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "sensor_logger")]
#[command(about = "Session-scoped data logger for networked sensor devices", long_about = None)]
struct Cli {
    /// Configuration file (defaults to sensor_logger.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Override server.bind_addr
        #[arg(long)]
        bind: Option<String>,
    },

    /// Start a logging session
    Start,

    /// Stop the running session and write its archive
    Stop {
        /// Archive path (defaults to session_<id>.zip in the working directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Rebuild the archive of a finished session
    Archive {
        /// Session id, e.g. 20240501_120000
        session_id: String,

        /// Archive path (defaults to session_<id>.zip in the working directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show the running session and its devices
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LoggerConfig::load_from(path),
        None => LoggerConfig::load(),
    }
    .context("failed to load configuration")?;
    config.validate()?;

    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let service = LoggerService::new(&config)?;

    match cli.command {
        Commands::Serve { bind } => serve(service, &config, bind),
        Commands::Start => print_json(&service.start_session()?),
        Commands::Stop { output } => stop(&service, output),
        Commands::Archive { session_id, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(archive_file_name(&session_id)));
            let bytes = service.archive_session(&session_id)?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("{}", output.display());
            Ok(())
        }
        Commands::Status => print_json(&service.status()?),
    }
}

fn stop(service: &LoggerService, output: Option<PathBuf>) -> Result<()> {
    let stopped = match service.coordinator().stop()? {
        StopOutcome::Stopped(stopped) => stopped,
        StopOutcome::NoActiveSession => return Err(LoggerError::NoActiveSession.into()),
    };

    let output = output.unwrap_or_else(|| PathBuf::from(archive_file_name(&stopped.session_id)));
    let summary = service
        .archiver()
        .archive_to_file(&stopped.directory, &output)
        .with_context(|| {
            format!(
                "session {} stopped but archiving failed; retry with `archive {}`",
                stopped.session_id, stopped.session_id
            )
        })?;

    info!(
        session_id = %stopped.session_id,
        archive = %output.display(),
        entries = summary.entries.len(),
        "session stopped"
    );
    println!("{}", output.display());
    Ok(())
}

#[cfg(feature = "http")]
fn serve(service: LoggerService, config: &LoggerConfig, bind: Option<String>) -> Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    sensor_logger::http::serve(std::sync::Arc::new(service), &bind_addr, config.server.worker_threads)
        .map_err(anyhow::Error::msg)
}

#[cfg(not(feature = "http"))]
fn serve(_service: LoggerService, _config: &LoggerConfig, _bind: Option<String>) -> Result<()> {
    anyhow::bail!("serve requires the 'http' feature; rebuild with --features http")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
