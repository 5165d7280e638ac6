//! River Mileage command line
//!
//! Reads a JSON network document, builds the river system once and writes the
//! requested table as JSON. Logs go to stderr so stdout stays machine-readable.

mod commands;
mod document;
mod logging;
mod settings;

use clap::Parser;
use document::{DistanceRecord, NetworkDocument, PointRecord, read_json, write_json};
use river_mileage_lib::{MileageError, RiverSystem};
use settings::{Command, Settings};
use std::process::ExitCode;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Mileage(#[from] MileageError),
}

fn run(settings: &Settings) -> Result<(), CliError> {
    let document: NetworkDocument = read_json(&settings.network)?;
    tracing::info!(
        "Loaded {} segments and {} outlet markers from {}",
        document.segments.len(),
        document.outlets.len(),
        settings.network.display()
    );

    let system = RiverSystem::build(document.segments(), &document.outlets(), settings.config())?;
    let info = system.info();
    tracing::info!(
        "Built river system: {} trunks, {} junctions, max rank {}",
        info.trunk_count,
        info.junction_count,
        info.max_rank
    );

    let output = settings.output.as_deref();
    match &settings.command {
        Command::Info => write_json(&info, output),
        Command::Ranks => write_json(&commands::ranks(&system), output),
        Command::Mileage { points, .. } => {
            let points: Vec<PointRecord> = read_json(points)?;
            let table = commands::mileage(&system, points)?;
            if !table.failures.is_empty() {
                tracing::warn!("{} points could not be resolved", table.failures.len());
            }
            write_json(&table, output)
        }
        Command::Place { rows, .. } => {
            let rows: Vec<DistanceRecord> = read_json(rows)?;
            write_json(&commands::place(&system, rows)?, output)
        }
        Command::Sample { per_segment, seed } => {
            write_json(&commands::sample(&system, *per_segment, *seed)?, output)
        }
    }
}

fn main() -> ExitCode {
    logging::setup_logging();
    let settings = Settings::parse();

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
