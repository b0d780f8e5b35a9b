//! Preprocessing transform: feature record -> fixed-width numeric vector.
//!
//! Numerical features are standardized with statistics learned at fit time;
//! categorical features are one-hot encoded against the fitted vocabulary
//! plus one trailing "unknown" slot. The vocabulary and the unknown policy
//! are plain data on the fitted transform, so training and serving apply
//! exactly the same mapping once the transform is persisted.
//!
//! Output layout: numericals in [`schema::NUMERICAL_FEATURES`] order, then
//! for each of [`schema::CATEGORICAL_FEATURES`] one slot per known value
//! (sorted) followed by the unknown slot.

use crate::error::TrainingError;
use crate::schema;
use crate::types::record::FeatureRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Suffix used in feature names for the unknown-category slot.
pub const UNKNOWN_SLOT: &str = "<unknown>";

/// Fitted standardization for one numerical feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaler {
    pub name: String,
    pub mean: f64,
    /// Population standard deviation of the training column.
    pub scale: f64,
}

impl NumericScaler {
    fn fit(name: &str, values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            name: name.to_string(),
            mean,
            scale: variance.sqrt(),
        }
    }

    /// `(value - mean) / scale`, or 0 for a constant training column.
    pub fn transform(&self, value: f64) -> f64 {
        if self.scale == 0.0 {
            0.0
        } else {
            (value - self.mean) / self.scale
        }
    }
}

/// Fitted one-hot encoding for one categorical feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    pub name: String,
    /// Distinct values seen at fit time, sorted.
    pub vocabulary: Vec<String>,
}

impl CategoryEncoder {
    fn fit<'a>(name: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        let vocabulary: BTreeSet<&str> = values.into_iter().collect();

        Self {
            name: name.to_string(),
            vocabulary: vocabulary.into_iter().map(str::to_string).collect(),
        }
    }

    /// Number of output slots: one per known value plus the unknown slot.
    pub fn width(&self) -> usize {
        self.vocabulary.len() + 1
    }

    /// Slot index for `value`; unseen values map to the last (unknown) slot.
    pub fn slot(&self, value: &str) -> usize {
        self.vocabulary
            .binary_search_by(|known| known.as_str().cmp(value))
            .unwrap_or(self.vocabulary.len())
    }

    pub fn is_known(&self, value: &str) -> bool {
        self.slot(value) < self.vocabulary.len()
    }

    fn encode_into(&self, value: &str, out: &mut Vec<f64>) {
        let hot = self.slot(value);
        out.extend((0..self.width()).map(|slot| if slot == hot { 1.0 } else { 0.0 }));
    }
}

/// Fitted preprocessing transform. Immutable once fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    numeric: Vec<NumericScaler>,
    categorical: Vec<CategoryEncoder>,
}

impl FeatureTransform {
    /// Learn standardization statistics and vocabularies from training records.
    pub fn fit<'a, I>(records: I) -> Result<Self, TrainingError>
    where
        I: IntoIterator<Item = &'a FeatureRecord>,
    {
        let mut numeric_columns: [Vec<f64>; schema::NUMERICAL_FEATURES.len()] = Default::default();
        let mut categorical_columns: [Vec<&str>; schema::CATEGORICAL_FEATURES.len()] =
            Default::default();

        for record in records {
            for (column, value) in numeric_columns.iter_mut().zip(record.numerical_values()) {
                column.push(value);
            }
            for (column, value) in categorical_columns
                .iter_mut()
                .zip(record.categorical_values())
            {
                column.push(value);
            }
        }

        if numeric_columns[0].is_empty() {
            return Err(TrainingError::Empty);
        }

        let numeric = schema::NUMERICAL_FEATURES
            .iter()
            .zip(&numeric_columns)
            .map(|(name, values)| NumericScaler::fit(name, values))
            .collect();

        let categorical = schema::CATEGORICAL_FEATURES
            .iter()
            .zip(categorical_columns)
            .map(|(name, values)| CategoryEncoder::fit(name, values))
            .collect();

        Ok(Self {
            numeric,
            categorical,
        })
    }

    /// Map a record to its numeric vector of length [`Self::feature_count`].
    pub fn apply(&self, record: &FeatureRecord) -> Vec<f64> {
        let mut features = Vec::with_capacity(self.feature_count());

        for (scaler, value) in self.numeric.iter().zip(record.numerical_values()) {
            features.push(scaler.transform(value));
        }
        for (encoder, value) in self.categorical.iter().zip(record.categorical_values()) {
            encoder.encode_into(value, &mut features);
        }

        features
    }

    /// Width of every vector produced by [`Self::apply`].
    pub fn feature_count(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(CategoryEncoder::width).sum::<usize>()
    }

    /// Names of the output slots, in vector order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|s| s.name.clone()).collect();
        for encoder in &self.categorical {
            names.extend(
                encoder
                    .vocabulary
                    .iter()
                    .map(|value| format!("{}={}", encoder.name, value)),
            );
            names.push(format!("{}={}", encoder.name, UNKNOWN_SLOT));
        }
        names
    }

    pub fn numeric_scalers(&self) -> &[NumericScaler] {
        &self.numeric
    }

    pub fn category_encoders(&self) -> &[CategoryEncoder] {
        &self.categorical
    }

    /// Categorical fields of `record` whose value was never seen at fit time.
    pub fn unknown_categories(&self, record: &FeatureRecord) -> Vec<&str> {
        self.categorical
            .iter()
            .zip(record.categorical_values())
            .filter(|(encoder, value)| !encoder.is_known(value))
            .map(|(encoder, _)| encoder.name.as_str())
            .collect()
    }

    /// Check that the fitted columns line up with the current schema.
    pub fn check_schema(&self) -> Result<(), String> {
        let numeric: Vec<&str> = self.numeric.iter().map(|s| s.name.as_str()).collect();
        if numeric != schema::NUMERICAL_FEATURES {
            return Err(format!(
                "numerical columns {numeric:?}, expected {:?}",
                schema::NUMERICAL_FEATURES
            ));
        }

        let categorical: Vec<&str> = self.categorical.iter().map(|e| e.name.as_str()).collect();
        if categorical != schema::CATEGORICAL_FEATURES {
            return Err(format!(
                "categorical columns {categorical:?}, expected {:?}",
                schema::CATEGORICAL_FEATURES
            ));
        }

        let sorted = self
            .categorical
            .iter()
            .all(|e| e.vocabulary.windows(2).all(|w| w[0] < w[1]));
        if !sorted {
            return Err("categorical vocabulary is not sorted and unique".to_string());
        }

        Ok(())
    }
}
