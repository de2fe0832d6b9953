//! Optional model metadata and artifact checksum validation

use super::read_json;
use crate::error::LoadError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Contents of `metadata.json`; unknown keys written by training are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Artifact file name -> lowercase hex SHA256
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl ModelMetadata {
    /// Metadata is optional: a missing file yields `None`, a broken one is an error
    pub fn load_optional(path: &Path) -> Result<Option<Self>, LoadError> {
        if !path.exists() {
            return Ok(None);
        }
        read_json(path).map(Some)
    }

    /// Check every listed artifact against its recorded digest
    pub fn verify_checksums(&self, dir: &Path) -> Result<(), LoadError> {
        for (file, expected) in &self.checksums {
            // Only plain file names inside the model directory
            if Path::new(file).file_name().and_then(|n| n.to_str()) != Some(file.as_str()) {
                return Err(LoadError::Integrity(format!(
                    "checksum entry {:?} is not a file name",
                    file
                )));
            }

            let path = dir.join(file);
            let data = fs::read(&path).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    LoadError::MissingArtifact { path: path.clone() }
                } else {
                    LoadError::Io {
                        path: path.clone(),
                        source,
                    }
                }
            })?;

            let actual = compute_checksum(&data);
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(LoadError::ChecksumMismatch {
                    file: file.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!(file = %file, checksum = %actual, "Artifact checksum validated");
        }
        Ok(())
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"test model weights");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"test model weights"));
        assert_ne!(checksum, compute_checksum(b"other weights"));
    }

    #[test]
    fn test_missing_metadata_is_none() {
        let dir = TempDir::new().unwrap();
        let meta = ModelMetadata::load_optional(&dir.path().join("metadata.json")).unwrap();
        assert!(meta.is_none());
    }

    #[test]
    fn test_metadata_without_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, r#"{"created_at": "2026-01-01T00:00:00Z"}"#).unwrap();

        let meta = ModelMetadata::load_optional(&path).unwrap().unwrap();
        assert!(meta.model_version.is_none());
        assert!(meta.checksums.is_empty());
    }

    #[test]
    fn test_checksum_entry_cannot_escape_directory() {
        let dir = TempDir::new().unwrap();
        let meta = ModelMetadata {
            checksums: BTreeMap::from([("../secret".to_string(), "00".to_string())]),
            ..Default::default()
        };
        assert!(matches!(
            meta.verify_checksums(dir.path()),
            Err(LoadError::Integrity(_))
        ));
    }

    #[test]
    fn test_checksum_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.json"), b"weights").unwrap();
        let meta = ModelMetadata {
            checksums: BTreeMap::from([(
                "model.json".to_string(),
                compute_checksum(b"weights").to_uppercase(),
            )]),
            ..Default::default()
        };
        assert!(meta.verify_checksums(dir.path()).is_ok());
    }
}
