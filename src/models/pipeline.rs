//! Transform + classifier, applied one after the other.

use crate::feature_extractor::FeatureTransform;
use crate::models::gbdt::GradientBoostedClassifier;
use crate::types::prediction::PredictionResult;
use crate::types::record::FeatureRecord;
use serde::{Deserialize, Serialize};

/// The two fitted stages of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedPipeline {
    pub transform: FeatureTransform,
    pub classifier: GradientBoostedClassifier,
}

impl TrainedPipeline {
    pub fn new(transform: FeatureTransform, classifier: GradientBoostedClassifier) -> Self {
        Self {
            transform,
            classifier,
        }
    }

    /// Score one validated record.
    pub fn predict(&self, record: &FeatureRecord) -> PredictionResult {
        let features = self.transform.apply(record);
        let class = self.classifier.predict(&features);
        PredictionResult::from_probabilities(class.probabilities)
    }

    /// Score many records.
    pub fn predict_batch(&self, records: &[FeatureRecord]) -> Vec<PredictionResult> {
        records.iter().map(|r| self.predict(r)).collect()
    }

    /// Check that both stages agree with each other and with the current schema.
    pub fn check(&self) -> Result<(), String> {
        self.transform.check_schema()?;
        self.classifier.check(self.transform.feature_count())
    }
}
