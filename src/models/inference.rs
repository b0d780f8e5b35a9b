//! Inference engine: one swappable handle to the loaded pipeline artifact.
//!
//! Requests take a snapshot (`Arc` clone) of the current artifact and score
//! against it without holding any lock. Reloading reads and verifies the new
//! artifact first and only then swaps the pointer, so an in-flight request
//! keeps the version it started with and a failed reload leaves the
//! previous artifact serving.

use crate::config::AppConfig;
use crate::error::{ArtifactLoadError, ModelUnavailable, PredictError};
use crate::models::loader::{self, PipelineArtifact};
use crate::schema;
use crate::types::prediction::PredictionResult;
use crate::types::record::FeatureRecord;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

/// Serving-side owner of the loaded artifact.
pub struct InferenceEngine {
    /// Where the artifact is (re)loaded from
    artifact_path: PathBuf,
    /// Currently served artifact; `None` while unready
    current: RwLock<Option<Arc<PipelineArtifact>>>,
}

impl InferenceEngine {
    /// Create an engine from configuration and attempt the startup load.
    pub fn new(config: &AppConfig) -> Self {
        Self::load_or_unready(&config.model.artifact_path)
    }

    /// Create an engine and try to load the artifact once.
    ///
    /// A failed load is logged and leaves the engine unready; it never
    /// prevents the engine (and the process around it) from starting.
    pub fn load_or_unready(artifact_path: impl Into<PathBuf>) -> Self {
        let engine = Self::unloaded(artifact_path);

        match engine.reload() {
            Ok(artifact) => info!(
                model_id = %artifact.metadata.model_id,
                trained_at = %artifact.metadata.trained_at,
                features = artifact.pipeline.transform.feature_count(),
                trees = artifact.pipeline.classifier.n_trees(),
                "Inference engine ready"
            ),
            Err(e) => error!(
                path = %engine.artifact_path.display(),
                error = %e,
                "Model artifact could not be loaded; serving as unready"
            ),
        }

        engine
    }

    /// Create an engine with no artifact loaded.
    pub fn unloaded(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            current: RwLock::new(None),
        }
    }

    /// Load the artifact from disk and swap it in.
    ///
    /// On error the previously loaded artifact (if any) stays in place.
    pub fn reload(&self) -> Result<Arc<PipelineArtifact>, ArtifactLoadError> {
        let artifact = Arc::new(loader::read_artifact(&self.artifact_path)?);

        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            current.replace(Arc::clone(&artifact))
        };

        match previous {
            Some(old) => info!(
                previous_model_id = %old.metadata.model_id,
                model_id = %artifact.metadata.model_id,
                "Model artifact swapped"
            ),
            None => info!(model_id = %artifact.metadata.model_id, "Model artifact loaded"),
        }

        Ok(artifact)
    }

    /// The artifact current at this instant.
    pub fn snapshot(&self) -> Option<Arc<PipelineArtifact>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Score an already validated record.
    pub fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult, ModelUnavailable> {
        let artifact = self.snapshot().ok_or(ModelUnavailable)?;
        Ok(score(&artifact, record))
    }

    /// Score a raw JSON request body.
    ///
    /// Readiness is checked first: while unready every request is answered
    /// with [`PredictError::Unavailable`], whatever its content.
    pub fn predict_json(&self, body: &[u8]) -> Result<PredictionResult, PredictError> {
        let artifact = self.snapshot().ok_or(ModelUnavailable)?;
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let record = schema::record_from_json(&value)?;
        Ok(score(&artifact, &record))
    }
}

fn score(artifact: &PipelineArtifact, record: &FeatureRecord) -> PredictionResult {
    let pipeline = &artifact.pipeline;

    let unknown = pipeline.transform.unknown_categories(record);
    if !unknown.is_empty() {
        warn!(
            model_id = %artifact.metadata.model_id,
            fields = ?unknown,
            "Categorical value not seen during training; using unknown slot"
        );
    }

    let result = pipeline.predict(record);
    debug!(
        model_id = %artifact.metadata.model_id,
        prediction = result.prediction,
        probability_success = result.probability_success,
        "Prediction complete"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureTransform;
    use crate::models::gbdt::{BoostingParams, GradientBoostedClassifier};
    use crate::models::pipeline::TrainedPipeline;

    fn record(skill: i64) -> FeatureRecord {
        FeatureRecord {
            job_type: "Plumbing".to_string(),
            job_priority: "High".to_string(),
            engineer_skill_level: skill,
            engineer_experience_years: 5,
            distance_km: 15.5,
        }
    }

    /// Trains a tiny model where success depends on skill level.
    fn artifact(threshold: i64) -> PipelineArtifact {
        let records: Vec<FeatureRecord> = (0..10).map(record).collect();
        let labels: Vec<bool> = (0..10).map(|i| i >= threshold).collect();
        let transform = FeatureTransform::fit(&records).unwrap();
        let rows: Vec<Vec<f64>> = records.iter().map(|r| transform.apply(r)).collect();
        let params = BoostingParams {
            n_estimators: 20,
            ..BoostingParams::default()
        };
        let classifier = GradientBoostedClassifier::fit(&rows, &labels, &params).unwrap();
        PipelineArtifact::new(TrainedPipeline::new(transform, classifier), params, 10, [5, 5])
    }

    #[test]
    fn test_missing_artifact_leaves_engine_unready() {
        let dir = tempfile::tempdir().unwrap();
        let engine = InferenceEngine::load_or_unready(dir.path().join("model.bin"));

        assert!(!engine.is_ready());
        assert_eq!(engine.predict(&record(3)), Err(ModelUnavailable));
        assert!(matches!(
            engine.predict_json(b"not even json"),
            Err(PredictError::Unavailable(_))
        ));
    }

    #[test]
    fn test_predict_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        loader::write_artifact(&path, &artifact(5)).unwrap();
        let engine = InferenceEngine::load_or_unready(&path);
        assert!(engine.is_ready());

        let body = br#"{"job_type":"Plumbing","job_priority":"High","engineer_skill_level":8,"engineer_experience_years":5,"distance_km":15.5}"#;
        let result = engine.predict_json(body).unwrap();
        assert_eq!(result.prediction, 1);
        assert!((result.probability_success + result.probability_failure - 1.0).abs() < 1e-6);

        let missing = br#"{"job_type":"Plumbing","job_priority":"High","engineer_skill_level":8,"engineer_experience_years":5}"#;
        match engine.predict_json(missing) {
            Err(PredictError::Invalid(e)) => assert_eq!(e.field(), Some("distance_km")),
            other => panic!("expected schema error, got {other:?}"),
        }

        assert!(matches!(
            engine.predict_json(b"{"),
            Err(PredictError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_reload_swaps_and_failed_reload_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let engine = InferenceEngine::unloaded(&path);
        assert!(engine.reload().is_err());
        assert!(!engine.is_ready());

        let first = artifact(5);
        loader::write_artifact(&path, &first).unwrap();
        engine.reload().unwrap();
        let held = engine.snapshot().unwrap();
        assert_eq!(held.metadata.model_id, first.metadata.model_id);

        let second = artifact(3);
        loader::write_artifact(&path, &second).unwrap();
        engine.reload().unwrap();
        assert_eq!(
            engine.snapshot().unwrap().metadata.model_id,
            second.metadata.model_id
        );
        // A snapshot taken before the swap still points at the old artifact.
        assert_eq!(held.metadata.model_id, first.metadata.model_id);

        std::fs::write(&path, b"garbage").unwrap();
        assert!(engine.reload().is_err());
        assert_eq!(
            engine.snapshot().unwrap().metadata.model_id,
            second.metadata.model_id
        );
    }
}
