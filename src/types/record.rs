//! Feature records and labeled training rows

use crate::schema;
use serde::{Deserialize, Serialize};

/// One job/engineer pairing to be scored.
///
/// Construct through [`schema::record_from_json`] or
/// [`schema::record_from_columns`] so every field is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Kind of job (open set, e.g. "Plumbing")
    pub job_type: String,

    /// Job priority (open set, e.g. "High")
    pub job_priority: String,

    /// Skill level of the assigned engineer
    pub engineer_skill_level: i64,

    /// Years of experience of the assigned engineer (>= 0)
    pub engineer_experience_years: i64,

    /// Distance from the engineer to the job site in kilometres (>= 0)
    pub distance_km: f64,
}

impl FeatureRecord {
    /// Numerical values in [`schema::NUMERICAL_FEATURES`] order.
    pub fn numerical_values(&self) -> [f64; schema::NUMERICAL_FEATURES.len()] {
        [
            self.engineer_skill_level as f64,
            self.engineer_experience_years as f64,
            self.distance_km,
        ]
    }

    /// Categorical values in [`schema::CATEGORICAL_FEATURES`] order.
    pub fn categorical_values(&self) -> [&str; schema::CATEGORICAL_FEATURES.len()] {
        [self.job_type.as_str(), self.job_priority.as_str()]
    }
}

/// A feature record with its ground-truth outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub features: FeatureRecord,
    pub success: bool,
}

impl LabeledRow {
    pub fn new(features: FeatureRecord, success: bool) -> Self {
        Self { features, success }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FeatureRecord {
        FeatureRecord {
            job_type: "Electrical".to_string(),
            job_priority: "Medium".to_string(),
            engineer_skill_level: 2,
            engineer_experience_years: 7,
            distance_km: 4.5,
        }
    }

    #[test]
    fn test_value_order_follows_schema() {
        let record = record();
        assert_eq!(record.numerical_values(), [2.0, 7.0, 4.5]);
        assert_eq!(record.categorical_values(), ["Electrical", "Medium"]);
    }

    #[test]
    fn test_record_serialization_uses_wire_names() {
        let json = serde_json::to_value(record()).unwrap();
        let object = json.as_object().unwrap();
        for spec in schema::FIELDS.iter() {
            assert!(object.contains_key(spec.name), "missing {}", spec.name);
        }
        assert_eq!(object.len(), schema::FIELDS.len());
    }
}
