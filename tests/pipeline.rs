//! Train -> persist -> load -> predict, across process-like boundaries.

mod common;

use approx::assert_relative_eq;
use job_success_predictor::error::{ArtifactLoadError, TrainingError, TrainingRunError};
use job_success_predictor::models::gbdt::BoostingParams;
use job_success_predictor::models::loader::{self, SCHEMA_VERSION};
use job_success_predictor::training::{self, TrainingRun, TrainingStage};
use job_success_predictor::types::prediction::Outcome;
use job_success_predictor::types::record::LabeledRow;
use job_success_predictor::InferenceEngine;

fn small_params() -> BoostingParams {
    BoostingParams {
        n_estimators: 30,
        ..BoostingParams::default()
    }
}

#[test]
fn test_loaded_artifact_predicts_identically() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::write_dataset(dir.path(), 200, 7);
    let artifact_path = dir.path().join("output").join("model.bin");

    let mut run = TrainingRun::new(&data, &artifact_path, small_params());
    let report = run.run().unwrap();
    assert_eq!(run.stage(), TrainingStage::Done);
    assert_eq!(report.rows, 200);
    assert!(report.training_accuracy > 0.7);

    // Same fit in memory to compare against.
    let rows = training::load_dataset(&data).unwrap();
    let in_memory = training::fit_pipeline(&rows, &small_params()).unwrap();

    let loaded = loader::read_artifact(&artifact_path).unwrap();
    assert_eq!(loaded.metadata.model_id, report.model_id);
    assert_eq!(loaded.pipeline, in_memory);

    for row in common::synthetic_rows(50, 99) {
        let a = loaded.pipeline.predict(&row.features);
        let b = in_memory.predict(&row.features);
        assert_eq!(a.probability_success.to_bits(), b.probability_success.to_bits());
        assert_eq!(a.prediction, b.prediction);
    }
}

#[test]
fn test_same_seed_same_model() {
    let rows = common::synthetic_rows(150, 3);
    let params = BoostingParams {
        n_estimators: 20,
        subsample: 0.7,
        seed: 11,
        ..BoostingParams::default()
    };

    let first = training::fit_pipeline(&rows, &params).unwrap();
    let second = training::fit_pipeline(&rows, &params).unwrap();
    assert_eq!(first, second);

    let other_seed = BoostingParams { seed: 12, ..params };
    let third = training::fit_pipeline(&rows, &other_seed).unwrap();
    assert_ne!(first.classifier, third.classifier);
}

#[test]
fn test_single_class_dataset_is_refused() {
    let rows: Vec<LabeledRow> = common::synthetic_rows(40, 5)
        .into_iter()
        .map(|r| LabeledRow::new(r.features, true))
        .collect();

    let err = training::fit_pipeline(&rows, &small_params()).unwrap_err();
    assert_eq!(err, TrainingError::SingleClass { label: 1, rows: 40 });

    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("ones.csv");
    std::fs::write(&data, common::to_csv(&rows)).unwrap();
    let artifact_path = dir.path().join("model.bin");

    let mut run = TrainingRun::new(&data, &artifact_path, small_params());
    assert!(matches!(
        run.run(),
        Err(TrainingRunError::Training(TrainingError::SingleClass { .. }))
    ));
    assert_eq!(run.stage(), TrainingStage::Failed);
    assert!(!artifact_path.exists());
}

#[test]
fn test_engine_serves_sample_request() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::write_dataset(dir.path(), 200, 21);
    let artifact_path = dir.path().join("model.bin");
    TrainingRun::new(&data, &artifact_path, small_params())
        .run()
        .unwrap();

    let engine = InferenceEngine::load_or_unready(&artifact_path);
    assert!(engine.is_ready());

    let result = engine.predict(&common::sample_request()).unwrap();
    assert!(result.prediction <= 1);
    assert!((0.0..=1.0).contains(&result.probability_success));
    assert!((0.0..=1.0).contains(&result.probability_failure));
    assert_relative_eq!(
        result.probability_success + result.probability_failure,
        1.0,
        epsilon = 1e-12
    );
    let expected = if result.prediction == 1 {
        Outcome::Success
    } else {
        Outcome::Failure
    };
    assert_eq!(result.prediction_label, expected);

    // Unseen category falls into the unknown slot instead of failing.
    let mut unseen = common::sample_request();
    unseen.job_type = "Roofing".to_string();
    assert!(engine.predict(&unseen).is_ok());
}

#[test]
fn test_retraining_never_exposes_partial_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::write_dataset(dir.path(), 120, 8);
    let artifact_path = dir.path().join("model.bin");

    let first = TrainingRun::new(&data, &artifact_path, small_params())
        .run()
        .unwrap();

    // A second run that fails while loading leaves the first artifact intact.
    let mut broken = TrainingRun::new(dir.path().join("absent.csv"), &artifact_path, small_params());
    assert!(broken.run().is_err());

    let survivor = loader::read_artifact(&artifact_path).unwrap();
    assert_eq!(survivor.metadata.model_id, first.model_id);

    // Only the artifact itself is left behind in the directory.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name != "model.bin" && name != "jobs.csv")
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}

#[test]
fn test_truncated_or_foreign_artifact_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::write_dataset(dir.path(), 120, 9);
    let artifact_path = dir.path().join("model.bin");
    TrainingRun::new(&data, &artifact_path, small_params())
        .run()
        .unwrap();

    let bytes = std::fs::read(&artifact_path).unwrap();

    let truncated = dir.path().join("truncated.bin");
    std::fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(
        loader::read_artifact(&truncated),
        Err(ArtifactLoadError::Truncated { .. })
    ));

    let mut newer = bytes.clone();
    newer[4..6].copy_from_slice(&(SCHEMA_VERSION + 1).to_le_bytes());
    let newer_path = dir.path().join("newer.bin");
    std::fs::write(&newer_path, &newer).unwrap();
    assert!(matches!(
        loader::read_artifact(&newer_path),
        Err(ArtifactLoadError::UnsupportedVersion { .. })
    ));

    let engine = InferenceEngine::load_or_unready(&truncated);
    assert!(!engine.is_ready());
}
