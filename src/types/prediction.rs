//! Prediction result returned to serving clients

use serde::{Deserialize, Serialize};

/// Predicted job outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Failure,
    Success,
}

impl Outcome {
    /// Binary class index (0 = failure, 1 = success)
    pub fn class(self) -> u8 {
        match self {
            Outcome::Failure => 0,
            Outcome::Success => 1,
        }
    }

    /// Pick the more probable class; ties go to success.
    pub fn from_probabilities(probability_failure: f64, probability_success: f64) -> Self {
        if probability_success >= probability_failure {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// Label plus class probabilities for one feature record.
///
/// Serializes directly as the success body of `POST /predict`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 0 = failure, 1 = success
    pub prediction: u8,

    /// "Success" or "Failure"
    pub prediction_label: Outcome,

    pub probability_success: f64,

    pub probability_failure: f64,
}

impl PredictionResult {
    /// Build a result from a `[failure, success]` probability pair.
    pub fn from_probabilities(probabilities: [f64; 2]) -> Self {
        let [probability_failure, probability_success] = probabilities;
        let outcome = Outcome::from_probabilities(probability_failure, probability_success);

        Self {
            prediction: outcome.class(),
            prediction_label: outcome,
            probability_success,
            probability_failure,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.prediction_label
    }
}
