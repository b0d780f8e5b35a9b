//! Training procedure: historical CSV -> fitted pipeline -> artifact file.
//!
//! Stages run strictly in order:
//! `LoadingData -> FittingTransform -> FittingClassifier -> Persisting -> Done`,
//! with `Failed` reachable from any of them. A failure stops the run; the
//! artifact path is only ever replaced by a complete file.

use crate::config::AppConfig;
use crate::error::{DataSourceError, TrainingError, TrainingRunError};
use crate::feature_extractor::FeatureTransform;
use crate::models::gbdt::{BoostingParams, GradientBoostedClassifier};
use crate::models::loader::{self, PipelineArtifact};
use crate::models::pipeline::TrainedPipeline;
use crate::schema;
use crate::types::record::{FeatureRecord, LabeledRow};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

/// Where a training run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStage {
    Pending,
    LoadingData,
    FittingTransform,
    FittingClassifier,
    Persisting,
    Done,
    Failed,
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model_id: Uuid,
    pub artifact_path: PathBuf,
    pub artifact_bytes: u64,
    pub rows: usize,
    /// `[failures, successes]`
    pub class_counts: [usize; 2],
    pub feature_count: usize,
    pub training_accuracy: f64,
    pub training_log_loss: f64,
    pub elapsed: Duration,
}

/// Load labeled rows from a CSV file.
pub fn load_dataset(path: &Path) -> Result<Vec<LabeledRow>, DataSourceError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => DataSourceError::NotFound {
            path: path.to_path_buf(),
        },
        _ => DataSourceError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    read_dataset(file)
}

/// Parse labeled rows from CSV with a header line.
///
/// Columns are matched by name; extra columns (e.g. `experience_level`
/// added by the ETL step) are ignored.
pub fn read_dataset<R: Read>(reader: R) -> Result<Vec<LabeledRow>, DataSourceError> {
    let mut csv = csv::Reader::from_reader(reader);
    let columns: HashMap<String, usize> = csv
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_string(), i))
        .collect();

    for required in schema::FIELDS.iter().map(|f| f.name).chain([schema::TARGET]) {
        if !columns.contains_key(required) {
            return Err(DataSourceError::MissingColumn {
                column: required.to_string(),
            });
        }
    }
    let target = columns[schema::TARGET];

    let mut rows = Vec::new();
    for (i, record) in csv.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(i as u64 + 2);

        let features = schema::record_from_columns(|name| {
            columns.get(name).and_then(|&idx| record.get(idx))
        })
        .map_err(|source| DataSourceError::InvalidRow { line, source })?;

        let raw_label = record.get(target).unwrap_or_default();
        let success = parse_label(raw_label).ok_or_else(|| DataSourceError::InvalidLabel {
            line,
            value: raw_label.to_string(),
        })?;

        rows.push(LabeledRow::new(features, success));
    }

    if rows.is_empty() {
        return Err(DataSourceError::Empty);
    }
    Ok(rows)
}

fn parse_label(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "1.0" | "true" | "True" | "TRUE" => Some(true),
        "0" | "0.0" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// `[failures, successes]`
pub fn class_counts(rows: &[LabeledRow]) -> [usize; 2] {
    let successes = rows.iter().filter(|r| r.success).count();
    [rows.len() - successes, successes]
}

/// Refuse datasets a binary classifier cannot be fit on.
pub fn ensure_both_classes(rows: &[LabeledRow]) -> Result<[usize; 2], TrainingError> {
    let counts = class_counts(rows);
    match counts {
        [0, 0] => Err(TrainingError::Empty),
        [0, n] => Err(TrainingError::SingleClass { label: 1, rows: n }),
        [n, 0] => Err(TrainingError::SingleClass { label: 0, rows: n }),
        _ => Ok(counts),
    }
}

/// First stage: fit the preprocessing transform.
pub fn fit_transform(rows: &[LabeledRow]) -> Result<FeatureTransform, TrainingError> {
    ensure_both_classes(rows)?;
    FeatureTransform::fit(rows.iter().map(|r| &r.features))
}

/// Second stage: fit the classifier on transformed rows.
pub fn fit_classifier(
    transform: &FeatureTransform,
    rows: &[LabeledRow],
    params: &BoostingParams,
) -> Result<GradientBoostedClassifier, TrainingError> {
    let matrix: Vec<Vec<f64>> = rows.iter().map(|r| transform.apply(&r.features)).collect();
    let labels: Vec<bool> = rows.iter().map(|r| r.success).collect();
    GradientBoostedClassifier::fit(&matrix, &labels, params)
}

/// Both stages, without any I/O.
pub fn fit_pipeline(
    rows: &[LabeledRow],
    params: &BoostingParams,
) -> Result<TrainedPipeline, TrainingError> {
    let transform = fit_transform(rows)?;
    let classifier = fit_classifier(&transform, rows, params)?;
    Ok(TrainedPipeline::new(transform, classifier))
}

/// Accuracy and mean log-loss of `pipeline` on `rows`.
pub fn evaluate(pipeline: &TrainedPipeline, rows: &[LabeledRow]) -> (f64, f64) {
    if rows.is_empty() {
        return (0.0, 0.0);
    }

    const EPS: f64 = 1e-15;
    let records: Vec<FeatureRecord> = rows.iter().map(|r| r.features.clone()).collect();
    let predictions = pipeline.predict_batch(&records);

    let mut correct = 0usize;
    let mut loss = 0.0;
    for (row, result) in rows.iter().zip(&predictions) {
        if result.prediction == u8::from(row.success) {
            correct += 1;
        }
        let p = result.probability_success.clamp(EPS, 1.0 - EPS);
        loss -= if row.success { p.ln() } else { (1.0 - p).ln() };
    }

    let n = rows.len() as f64;
    (correct as f64 / n, loss / n)
}

/// One batch training run.
pub struct TrainingRun {
    data_path: PathBuf,
    artifact_path: PathBuf,
    params: BoostingParams,
    stage: TrainingStage,
}

impl TrainingRun {
    pub fn new(
        data_path: impl Into<PathBuf>,
        artifact_path: impl Into<PathBuf>,
        params: BoostingParams,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            artifact_path: artifact_path.into(),
            params,
            stage: TrainingStage::Pending,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.training.data_path,
            &config.model.artifact_path,
            config.training.boosting_params(),
        )
    }

    pub fn stage(&self) -> TrainingStage {
        self.stage
    }

    /// Run every stage to completion or to the first failure.
    pub fn run(&mut self) -> Result<TrainingReport, TrainingRunError> {
        let started = Instant::now();
        let result = self.execute(started);

        if let Err(e) = &result {
            let failed_in = self.stage;
            self.transition(TrainingStage::Failed);
            error!(stage = ?failed_in, error = %e, "Training run failed");
        }
        result
    }

    fn transition(&mut self, next: TrainingStage) {
        info!(from = ?self.stage, to = ?next, "Training stage");
        self.stage = next;
    }

    fn execute(&mut self, started: Instant) -> Result<TrainingReport, TrainingRunError> {
        self.params.validate()?;

        self.transition(TrainingStage::LoadingData);
        let rows = load_dataset(&self.data_path)?;
        info!(path = %self.data_path.display(), rows = rows.len(), "Dataset loaded");

        self.transition(TrainingStage::FittingTransform);
        let transform = fit_transform(&rows)?;
        let counts = class_counts(&rows);
        info!(
            features = transform.feature_count(),
            failures = counts[0],
            successes = counts[1],
            "Preprocessing transform fitted"
        );

        self.transition(TrainingStage::FittingClassifier);
        let classifier = fit_classifier(&transform, &rows, &self.params)?;
        let pipeline = TrainedPipeline::new(transform, classifier);
        let (accuracy, log_loss) = evaluate(&pipeline, &rows);
        info!(
            trees = pipeline.classifier.n_trees(),
            training_accuracy = accuracy,
            training_log_loss = log_loss,
            "Classifier fitted"
        );

        self.transition(TrainingStage::Persisting);
        let feature_count = pipeline.transform.feature_count();
        let artifact = PipelineArtifact::new(pipeline, self.params.clone(), rows.len(), counts);
        let artifact_bytes = loader::write_artifact(&self.artifact_path, &artifact)?;

        self.transition(TrainingStage::Done);
        Ok(TrainingReport {
            model_id: artifact.metadata.model_id,
            artifact_path: self.artifact_path.clone(),
            artifact_bytes,
            rows: rows.len(),
            class_counts: counts,
            feature_count,
            training_accuracy: accuracy,
            training_log_loss: log_loss,
            elapsed: started.elapsed(),
        })
    }
}
