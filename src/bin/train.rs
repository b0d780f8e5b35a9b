//! Job Success Predictor - Training Entry Point
//!
//! Fits the preprocessing transform and classifier on the historical dataset
//! and writes the pipeline artifact that the serving process loads.

use anyhow::{Context, Result};
use clap::Parser;
use job_success_predictor::{config::AppConfig, logging, training::TrainingRun};
use std::path::PathBuf;
use tracing::info;

/// Train the job success pipeline and persist it.
#[derive(Parser)]
#[command(name = "job-predictor-train", version, about)]
struct Args {
    /// Configuration file (optional)
    #[arg(short, long, default_value = job_success_predictor::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Labeled historical dataset (CSV)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Where to write the artifact
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of boosting stages
    #[arg(long)]
    n_estimators: Option<usize>,

    /// Seed for every random choice made while fitting
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_from_path(&args.config)?;
    if let Some(data) = args.data {
        config.training.data_path = data;
    }
    if let Some(output) = args.output {
        config.model.artifact_path = output;
    }
    if let Some(n) = args.n_estimators {
        config.training.n_estimators = n;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }

    logging::init(&config.logging)?;
    info!(
        data = %config.training.data_path.display(),
        artifact = %config.model.artifact_path.display(),
        params = ?config.training.boosting_params(),
        "Starting training run"
    );

    let mut run = TrainingRun::from_config(&config);
    let report = run.run().context("Training run failed")?;

    info!(
        model_id = %report.model_id,
        rows = report.rows,
        failures = report.class_counts[0],
        successes = report.class_counts[1],
        features = report.feature_count,
        training_accuracy = format!("{:.4}", report.training_accuracy),
        training_log_loss = format!("{:.4}", report.training_log_loss),
        artifact = %report.artifact_path.display(),
        bytes = report.artifact_bytes,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Model training complete"
    );
    Ok(())
}
