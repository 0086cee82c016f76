//! Model manifest
//!
//! A manifest is the versioned JSON descriptor shipped next to the classifier
//! artifact. It pins the label ordering and the preprocessing constants the
//! artifact was trained with, and optionally its SHA256 checksum.

use crate::error::{PestError, Result};
use crate::models::LabelSet;
use crate::preprocess::PreprocessConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Upper bound on artifact size accepted at startup
pub const MAX_ARTIFACT_BYTES: usize = 512 * 1024 * 1024;

/// Descriptor binding a model artifact to its input contract and labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub version: String,
    /// Artifact path, relative to the manifest's directory unless absolute
    pub artifact: PathBuf,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub input: PreprocessConfig,
    pub labels: Vec<String>,
    #[serde(skip)]
    base_dir: PathBuf,
}

/// Raw artifact bytes and their verified checksum
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub bytes: Vec<u8>,
    pub checksum: String,
}

impl ModelManifest {
    /// Read and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PestError::ModelLoad(format!("failed to read manifest {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let manifest = Self::from_json_str(&content, base_dir)?;

        debug!(
            path = %path.display(),
            version = %manifest.version,
            classes = manifest.labels.len(),
            "Loaded model manifest"
        );
        Ok(manifest)
    }

    /// Parse a manifest whose relative artifact path resolves against `base_dir`
    pub fn from_json_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut manifest: ModelManifest = serde_json::from_str(content)
            .map_err(|e| PestError::ModelLoad(format!("invalid model manifest: {}", e)))?;
        manifest.base_dir = base_dir.into();
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(PestError::ModelLoad("manifest version is empty".to_string()));
        }
        if let Some(expected) = &self.sha256 {
            if expected.len() != 64 || hex::decode(expected).is_err() {
                return Err(PestError::ModelLoad(format!(
                    "manifest sha256 '{}' is not a 64 character hex digest",
                    expected
                )));
            }
        }
        self.input.validate()?;
        self.label_set()?;
        Ok(())
    }

    pub fn label_set(&self) -> Result<LabelSet> {
        LabelSet::new(self.labels.iter().cloned())
    }

    pub fn artifact_path(&self) -> PathBuf {
        if self.artifact.is_absolute() {
            self.artifact.clone()
        } else {
            self.base_dir.join(&self.artifact)
        }
    }

    /// Read the artifact and verify it against the pinned checksum
    pub fn read_artifact(&self) -> Result<LoadedArtifact> {
        let path = self.artifact_path();
        let bytes = fs::read(&path).map_err(|e| {
            PestError::ModelLoad(format!("failed to read model artifact {}: {}", path.display(), e))
        })?;

        if bytes.is_empty() {
            return Err(PestError::ModelLoad(format!(
                "model artifact {} is empty",
                path.display()
            )));
        }
        if bytes.len() > MAX_ARTIFACT_BYTES {
            return Err(PestError::ModelLoad(format!(
                "model artifact size {} exceeds maximum {}",
                bytes.len(),
                MAX_ARTIFACT_BYTES
            )));
        }

        let checksum = compute_checksum(&bytes);
        if let Some(expected) = &self.sha256 {
            if !expected.eq_ignore_ascii_case(&checksum) {
                return Err(PestError::ModelLoad(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected, checksum
                )));
            }
        }

        info!(
            version = %self.version,
            path = %path.display(),
            size = bytes.len(),
            checksum = %checksum,
            "Model artifact read"
        );

        Ok(LoadedArtifact { bytes, checksum })
    }
}

/// Compute SHA256 checksum of data as lowercase hex
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
