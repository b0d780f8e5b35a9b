//! Trained pipeline artifact: binary format, atomic write, verified read.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "JSPA"
//! 4       2     schema version (u16 LE)
//! 6       2     reserved (zero)
//! 8       8     payload length (u64 LE)
//! 16      32    SHA-256 of payload
//! 48      ..    postcard-encoded `PipelineArtifact`
//! ```
//!
//! Only artifacts carrying [`SCHEMA_VERSION`] are accepted; there is no
//! migration path between versions.

use crate::error::{ArtifactLoadError, ArtifactWriteError};
use crate::models::gbdt::BoostingParams;
use crate::models::pipeline::TrainedPipeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Magic bytes identifying a pipeline artifact.
pub const MAGIC: &[u8; 4] = b"JSPA";

/// Bumped whenever the payload layout or the feature schema changes.
pub const SCHEMA_VERSION: u16 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 48;

/// Facts about how an artifact was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub crate_version: String,
    pub training_rows: usize,
    /// `[failures, successes]` in the training set
    pub class_counts: [usize; 2],
    pub params: BoostingParams,
    /// Names of the preprocessed vector slots, in order.
    pub feature_names: Vec<String>,
}

/// Everything persisted for one trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub metadata: ArtifactMetadata,
    pub pipeline: TrainedPipeline,
}

impl PipelineArtifact {
    /// Bundle a freshly fitted pipeline with new metadata.
    pub fn new(
        pipeline: TrainedPipeline,
        params: BoostingParams,
        training_rows: usize,
        class_counts: [usize; 2],
    ) -> Self {
        let metadata = ArtifactMetadata {
            model_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            training_rows,
            class_counts,
            params,
            feature_names: pipeline.transform.feature_names(),
        };

        Self { metadata, pipeline }
    }

    fn check(&self) -> Result<(), ArtifactLoadError> {
        self.pipeline
            .check()
            .map_err(ArtifactLoadError::SchemaMismatch)?;

        if self.metadata.feature_names != self.pipeline.transform.feature_names() {
            return Err(ArtifactLoadError::SchemaMismatch(
                "metadata feature names disagree with the fitted transform".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serialize an artifact into header + payload bytes.
pub fn encode(artifact: &PipelineArtifact) -> Result<Vec<u8>, ArtifactWriteError> {
    let payload = postcard::to_allocvec(artifact).map_err(ArtifactWriteError::Encode)?;
    let digest = Sha256::digest(&payload);

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 2]);
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&digest);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Verify header and checksum, then decode the payload.
pub fn decode(bytes: &[u8]) -> Result<PipelineArtifact, ArtifactLoadError> {
    if bytes.len() < HEADER_SIZE {
        // A short file that does not even start with the magic is not ours at all.
        if !MAGIC.starts_with(&bytes[..bytes.len().min(MAGIC.len())]) {
            return Err(ArtifactLoadError::BadMagic);
        }
        return Err(ArtifactLoadError::Truncated {
            expected: HEADER_SIZE as u64,
            actual: bytes.len() as u64,
        });
    }

    if &bytes[..4] != MAGIC {
        return Err(ArtifactLoadError::BadMagic);
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != SCHEMA_VERSION {
        return Err(ArtifactLoadError::UnsupportedVersion {
            found: version,
            expected: SCHEMA_VERSION,
        });
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[8..16]);
    let payload_len = u64::from_le_bytes(len);
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() as u64 != payload_len {
        return Err(ArtifactLoadError::Truncated {
            expected: HEADER_SIZE as u64 + payload_len,
            actual: bytes.len() as u64,
        });
    }

    if Sha256::digest(payload).as_slice() != &bytes[16..HEADER_SIZE] {
        return Err(ArtifactLoadError::ChecksumMismatch);
    }

    let artifact: PipelineArtifact =
        postcard::from_bytes(payload).map_err(ArtifactLoadError::Decode)?;
    artifact.check()?;
    Ok(artifact)
}

/// Persist an artifact so readers see either the old file or the new one.
///
/// Returns the number of bytes written.
pub fn write_artifact(path: &Path, artifact: &PipelineArtifact) -> Result<u64, ArtifactWriteError> {
    let bytes = encode(artifact)?;
    write_atomic(path, |file| file.write_all(&bytes))?;

    info!(
        path = %path.display(),
        model_id = %artifact.metadata.model_id,
        bytes = bytes.len(),
        "Artifact written"
    );
    Ok(bytes.len() as u64)
}

/// Read and verify an artifact.
pub fn read_artifact(path: &Path) -> Result<PipelineArtifact, ArtifactLoadError> {
    let bytes = fs::read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ArtifactLoadError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ArtifactLoadError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let artifact = decode(&bytes)?;
    debug!(
        path = %path.display(),
        model_id = %artifact.metadata.model_id,
        trees = artifact.pipeline.classifier.n_trees(),
        "Artifact decoded"
    );
    Ok(artifact)
}

/// Write a file via a temporary sibling and an atomic rename.
///
/// `write` fills the temporary file. If it fails, or the process dies
/// before the rename, the target path is left untouched and the temporary
/// file is removed (or, after a crash, left under a random name).
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), ArtifactWriteError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|source| ArtifactWriteError::CreateDir {
        dir: dir.clone(),
        source,
    })?;

    let write_err = |source: io::Error| ArtifactWriteError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
    write(tmp.as_file_mut()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureTransform;
    use crate::models::gbdt::GradientBoostedClassifier;
    use crate::types::record::FeatureRecord;

    fn record(job_type: &str, skill: i64, km: f64) -> FeatureRecord {
        FeatureRecord {
            job_type: job_type.to_string(),
            job_priority: "High".to_string(),
            engineer_skill_level: skill,
            engineer_experience_years: 4,
            distance_km: km,
        }
    }

    fn artifact() -> PipelineArtifact {
        let records: Vec<FeatureRecord> = (0..12)
            .map(|i| record(if i % 2 == 0 { "Plumbing" } else { "HVAC" }, i, i as f64 * 2.5))
            .collect();
        let labels: Vec<bool> = (0..12).map(|i| i >= 6).collect();

        let transform = FeatureTransform::fit(&records).unwrap();
        let rows: Vec<Vec<f64>> = records.iter().map(|r| transform.apply(r)).collect();
        let params = BoostingParams {
            n_estimators: 10,
            ..BoostingParams::default()
        };
        let classifier = GradientBoostedClassifier::fit(&rows, &labels, &params).unwrap();

        PipelineArtifact::new(TrainedPipeline::new(transform, classifier), params, 12, [6, 6])
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let original = artifact();
        let bytes = encode(&original).unwrap();
        assert_eq!(&bytes[..4], MAGIC);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, original);

        let probe = record("Carpentry", 3, 7.25);
        assert_eq!(
            decoded.pipeline.predict(&probe),
            original.pipeline.predict(&probe)
        );
    }

    #[test]
    fn test_truncated_artifact_is_rejected() {
        let bytes = encode(&artifact()).unwrap();

        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, ArtifactLoadError::Truncated { .. }));

        let err = decode(&bytes[..10]).unwrap_err();
        assert!(matches!(err, ArtifactLoadError::Truncated { .. }));

        let err = decode(&[]).unwrap_err();
        assert!(matches!(err, ArtifactLoadError::Truncated { .. }));
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut bytes = encode(&artifact()).unwrap();
        bytes[4..6].copy_from_slice(&(SCHEMA_VERSION + 1).to_le_bytes());

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ArtifactLoadError::UnsupportedVersion { found, expected }
                if found == SCHEMA_VERSION + 1 && expected == SCHEMA_VERSION
        ));
    }

    #[test]
    fn test_corruption_is_detected() {
        let mut bytes = encode(&artifact()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            decode(&bytes).unwrap_err(),
            ArtifactLoadError::ChecksumMismatch
        ));

        let mut bytes = encode(&artifact()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes).unwrap_err(), ArtifactLoadError::BadMagic));

        assert!(matches!(
            decode(b"pickle").unwrap_err(),
            ArtifactLoadError::BadMagic
        ));
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.bin");
        let original = artifact();

        let written = write_artifact(&path, &original).unwrap();
        assert_eq!(written, fs::metadata(&path).unwrap().len());

        let loaded = read_artifact(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_artifact(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ArtifactLoadError::NotFound { .. }));
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let original = artifact();
        write_artifact(&path, &original).unwrap();

        let replacement = encode(&artifact()).unwrap();
        let err = write_atomic(&path, |file| {
            file.write_all(&replacement[..replacement.len() / 2])?;
            Err(io::Error::new(io::ErrorKind::Other, "disk went away"))
        })
        .unwrap_err();
        assert!(matches!(err, ArtifactWriteError::Write { .. }));

        // Previous artifact is intact and no temporary file is left behind.
        assert_eq!(read_artifact(&path).unwrap(), original);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();

        let err = write_artifact(&blocker.join("model.bin"), &artifact()).unwrap_err();
        assert!(matches!(err, ArtifactWriteError::CreateDir { .. }));
    }
}
