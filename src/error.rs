//! Error taxonomy for training, artifact persistence and serving.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A feature record did not satisfy the feature schema.
///
/// Always caused by the caller and recoverable by correcting the input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaValidationError {
    #[error("field `{field}` is missing")]
    Missing { field: &'static str },

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{field}` is out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },

    #[error("field `{field}` is not part of the feature schema")]
    UnexpectedField { field: String },

    #[error("feature record must be a JSON object")]
    NotAnObject,
}

impl SchemaValidationError {
    /// Name of the offending field, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Missing { field }
            | Self::WrongType { field, .. }
            | Self::OutOfRange { field, .. } => Some(field),
            Self::UnexpectedField { field } => Some(field),
            Self::NotAnObject => None,
        }
    }
}

/// The historical dataset could not be turned into labeled rows.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("dataset not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to open dataset {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed CSV")]
    Csv(#[from] csv::Error),

    #[error("dataset has no rows")]
    Empty,

    #[error("dataset is missing required column `{column}`")]
    MissingColumn { column: String },

    #[error("line {line}: invalid record")]
    InvalidRow {
        line: u64,
        #[source]
        source: SchemaValidationError,
    },

    #[error("line {line}: label `{value}` is not one of 0/1")]
    InvalidLabel { line: u64, value: String },
}

/// The pipeline could not be fitted on the loaded rows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("no training rows")]
    Empty,

    #[error("all {rows} training rows have success={label}; both classes are required")]
    SingleClass { label: u8, rows: usize },

    #[error("feature rows have inconsistent widths (expected {expected}, found {found})")]
    RaggedFeatures { expected: usize, found: usize },

    #[error("{features} feature rows but {labels} labels")]
    LabelCountMismatch { features: usize, labels: usize },

    #[error("invalid training parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// The artifact (or another atomically written file) could not be persisted.
#[derive(Debug, Error)]
pub enum ArtifactWriteError {
    #[error("cannot create directory {}", dir.display())]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot encode artifact payload: {0}")]
    Encode(postcard::Error),
}

/// A persisted artifact could not be trusted or decoded.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("artifact not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("cannot read artifact {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("artifact is truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("not a pipeline artifact (bad magic bytes)")]
    BadMagic,

    #[error("artifact schema version {found} is not supported (reader expects {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("artifact payload checksum mismatch")]
    ChecksumMismatch,

    #[error("cannot decode artifact payload: {0}")]
    Decode(postcard::Error),

    #[error("artifact feature layout does not match the current schema: {0}")]
    SchemaMismatch(String),
}

/// Serving-time: no artifact has been loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("model is not loaded; predictions are unavailable")]
pub struct ModelUnavailable;

/// Why a single prediction request could not be answered.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Unavailable(#[from] ModelUnavailable),

    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] SchemaValidationError),
}

/// A training run stopped; the variant tells which stage gave up.
#[derive(Debug, Error)]
pub enum TrainingRunError {
    #[error("loading training data failed")]
    DataSource(#[from] DataSourceError),

    #[error("fitting the pipeline failed")]
    Training(#[from] TrainingError),

    #[error("persisting the artifact failed")]
    ArtifactWrite(#[from] ArtifactWriteError),
}

/// An ETL run stopped.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("reading the raw dataset failed")]
    Source(#[from] DataSourceError),

    #[error("writing the transformed dataset failed")]
    Output(#[from] ArtifactWriteError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_field() {
        let err = SchemaValidationError::Missing {
            field: "distance_km",
        };
        assert_eq!(err.field(), Some("distance_km"));
        assert_eq!(err.to_string(), "field `distance_km` is missing");

        assert_eq!(SchemaValidationError::NotAnObject.field(), None);
    }

    #[test]
    fn test_training_run_error_keeps_source() {
        let err = TrainingRunError::from(TrainingError::SingleClass { label: 1, rows: 3 });
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("all 3 training rows have success=1; both classes are required")
        );
    }
}
