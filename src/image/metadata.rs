//! Image metadata supplied by the build platform

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Platform and runtime settings for the pushed image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Ordered so the rendered config is stable
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ImageMetadata {
    pub fn new(architecture: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            os: os.into(),
            variant: None,
            entrypoint: Vec::new(),
            command: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.architecture.trim().is_empty() || self.os.trim().is_empty() {
            return Err(RegistryError::Configuration(
                "Image metadata requires an architecture and an os".to_string(),
            ));
        }
        if let Some(key) = self.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(RegistryError::Configuration(format!(
                "Invalid environment variable name {:?}",
                key
            )));
        }
        Ok(())
    }

    /// `KEY=VALUE` pairs in key order
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

/// Where per-push image metadata comes from
#[async_trait]
pub trait ImageMetadataSource: Send + Sync {
    async fn image_metadata(&self) -> Result<ImageMetadata>;
}

#[async_trait]
impl ImageMetadataSource for ImageMetadata {
    async fn image_metadata(&self) -> Result<ImageMetadata> {
        self.validate()?;
        Ok(self.clone())
    }
}

/// Reads metadata from a JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileMetadataSource {
    path: PathBuf,
}

impl JsonFileMetadataSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ImageMetadataSource for JsonFileMetadataSource {
    async fn image_metadata(&self) -> Result<ImageMetadata> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            RegistryError::Configuration(format!(
                "Cannot read image metadata {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let metadata: ImageMetadata = serde_json::from_slice(&raw).map_err(|e| {
            RegistryError::Configuration(format!(
                "Invalid image metadata in {}: {}",
                self.path.display(),
                e
            ))
        })?;

        metadata.validate()?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_json_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"architecture":"arm64","os":"linux","entrypoint":["/bin/app"],"workingDir":"/srv","env":{{"B":"2","A":"1"}}}}"#
        )
        .unwrap();

        let metadata = JsonFileMetadataSource::new(file.path()).image_metadata().await.unwrap();
        assert_eq!(metadata.architecture, "arm64");
        assert_eq!(metadata.entrypoint, vec!["/bin/app".to_string()]);
        assert!(metadata.command.is_empty());
        assert_eq!(metadata.working_dir.as_deref(), Some("/srv"));
        assert_eq!(metadata.env_pairs(), vec!["A=1".to_string(), "B=2".to_string()]);
    }

    #[tokio::test]
    async fn test_json_file_source_rejects_missing_os() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"architecture":"amd64","os":""}}"#).unwrap();
        assert!(JsonFileMetadataSource::new(file.path()).image_metadata().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let err = JsonFileMetadataSource::new("/nonexistent/metadata.json")
            .image_metadata()
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));
    }

    #[test]
    fn test_validate_env_names() {
        let mut metadata = ImageMetadata::new("amd64", "linux");
        assert!(metadata.validate().is_ok());
        metadata.env.insert("BAD=NAME".to_string(), "x".to_string());
        assert!(metadata.validate().is_err());
    }
}
