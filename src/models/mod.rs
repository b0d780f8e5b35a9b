//! Model components: classifier, pipeline composition, artifact I/O and serving handle

pub mod gbdt;
pub mod inference;
pub mod loader;
pub mod pipeline;

pub use gbdt::{BoostingParams, GradientBoostedClassifier};
pub use inference::InferenceEngine;
pub use loader::{ArtifactMetadata, PipelineArtifact};
pub use pipeline::TrainedPipeline;
