//! Job Success Predictor - ETL Entry Point
//!
//! Reads raw job data, adds the `experience_level` column and saves the
//! transformed file.

use anyhow::{Context, Result};
use clap::Parser;
use job_success_predictor::{config::AppConfig, etl, logging};
use std::path::PathBuf;
use tracing::{error, info};

/// Derive experience tiers for raw job data.
#[derive(Parser)]
#[command(name = "job-predictor-etl", version, about)]
struct Args {
    /// Configuration file (optional)
    #[arg(short, long, default_value = job_success_predictor::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Raw job data (CSV)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Transformed output (CSV)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_from_path(&args.config)?;
    if let Some(input) = args.input {
        config.etl.input_path = input;
    }
    if let Some(output) = args.output {
        config.etl.output_path = output;
    }

    logging::init(&config.logging)?;

    let report = etl::run(&config.etl.input_path, &config.etl.output_path)
        .map_err(|e| {
            error!(error = %e, "ETL run failed");
            e
        })
        .with_context(|| format!("ETL run over {} failed", config.etl.input_path.display()))?;

    info!(rows = report.rows, "ETL complete");
    Ok(())
}
