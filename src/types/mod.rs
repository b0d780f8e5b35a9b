//! Type definitions shared by training and serving

pub mod prediction;
pub mod record;

pub use prediction::{Outcome, PredictionResult};
pub use record::{FeatureRecord, LabeledRow};
