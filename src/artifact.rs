//! Versioned on-disk pipeline artifact
//!
//! Layout: 4-byte magic `FSNT`, little-endian `u32` format version, then the
//! bincode-encoded [`PipelineArtifact`].

use crate::error::{SentinelError, SentinelResult};
use crate::pipeline::{Pipeline, PipelineParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

pub const ARTIFACT_MAGIC: &[u8; 4] = b"FSNT";
pub const ARTIFACT_VERSION: u32 = 2;
pub const DEFAULT_ARTIFACT_FILE: &str = "fraud_detection_model.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub source: String,
    pub params: PipelineParams,
}

/// Fitted pipeline plus the metadata needed to score against it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub metadata: ArtifactMetadata,
    pub pipeline: Pipeline,
}

impl PipelineArtifact {
    pub fn new(pipeline: Pipeline, metadata: ArtifactMetadata) -> Self {
        Self { metadata, pipeline }
    }

    /// Ordered feature columns the pipeline was fitted on
    pub fn expected_features(&self) -> &[String] {
        &self.pipeline.schema().expected_features
    }

    pub fn to_bytes(&self) -> SentinelResult<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| SentinelError::ArtifactFormat {
            reason: e.to_string(),
        })?;
        let mut bytes = Vec::with_capacity(body.len() + 8);
        bytes.extend_from_slice(ARTIFACT_MAGIC);
        bytes.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> SentinelResult<Self> {
        if bytes.len() < 8 || &bytes[..4] != ARTIFACT_MAGIC {
            return Err(SentinelError::ArtifactFormat {
                reason: "missing FSNT header".to_string(),
            });
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(version);
        if version != ARTIFACT_VERSION {
            return Err(SentinelError::UnsupportedArtifactVersion {
                found: version,
                expected: ARTIFACT_VERSION,
            });
        }

        bincode::deserialize(&bytes[8..]).map_err(|e| SentinelError::ArtifactFormat {
            reason: e.to_string(),
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SentinelResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SentinelError::io(format!("creating {}", parent.display()), e))?;
        }
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes)
            .map_err(|e| SentinelError::io(format!("writing {}", path.display()), e))?;
        info!(path = %path.display(), bytes = bytes.len(), "Artifact saved");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SentinelResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SentinelError::ArtifactNotFound {
                path: path.to_path_buf(),
            },
            _ => SentinelError::io(format!("reading {}", path.display()), e),
        })?;
        let artifact = Self::from_bytes(&bytes)?;
        info!(
            path = %path.display(),
            clusters = artifact.pipeline.n_clusters(),
            features = artifact.expected_features().len(),
            trained_at = %artifact.metadata.trained_at,
            "Artifact loaded"
        );
        Ok(artifact)
    }
}
