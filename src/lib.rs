//! Job Success Predictor Library
//!
//! Predicts whether a field-service job will succeed from job and engineer
//! attributes. Training fits a preprocessing transform and a gradient-boosted
//! classifier and persists both as one versioned artifact; serving loads that
//! artifact and answers point predictions over HTTP; the ETL step derives an
//! experience tier for raw job data.

pub mod config;
pub mod error;
pub mod etl;
pub mod feature_extractor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod server;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{
    ArtifactLoadError, ArtifactWriteError, DataSourceError, ModelUnavailable, PredictError,
    SchemaValidationError, TrainingError,
};
pub use feature_extractor::FeatureTransform;
pub use models::inference::InferenceEngine;
pub use models::loader::PipelineArtifact;
pub use training::{TrainingReport, TrainingRun};
pub use types::{prediction::PredictionResult, record::FeatureRecord};
