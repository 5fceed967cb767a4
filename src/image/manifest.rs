//! OCI image config and manifest assembly and upload

use crate::config::RegistryConfig;
use crate::digest::Digest;
use crate::error::handlers::{HttpErrorHandler, ValidationErrorHandler};
use crate::error::{RegistryError, Result};
use crate::image::layer::LayerDescriptor;
use crate::image::metadata::ImageMetadata;
use crate::logging::Logger;
use crate::registry::transport::AuthenticatedTransport;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";

const CONFIG_STEP: &str = "uploading image config";
const MANIFEST_STEP: &str = "uploading manifest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
}

impl From<&LayerDescriptor> for Descriptor {
    fn from(layer: &LayerDescriptor) -> Self {
        Self {
            media_type: layer.media_type().to_string(),
            digest: layer.digest().clone(),
            size: layer.size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub config: RuntimeConfig,
    pub rootfs: RootFs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(rename = "Entrypoint", default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(rename = "Cmd", default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(rename = "WorkingDir", default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(rename = "Env", default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    pub diff_ids: Vec<Digest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// Serialized config and manifest, ready to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledImage {
    pub config: Vec<u8>,
    pub config_descriptor: Descriptor,
    pub manifest: Vec<u8>,
    pub manifest_digest: Digest,
}

impl ImageConfig {
    pub fn new(layers: &[LayerDescriptor], metadata: &ImageMetadata) -> Self {
        Self {
            architecture: metadata.architecture.clone(),
            os: metadata.os.clone(),
            variant: metadata.variant.clone(),
            config: RuntimeConfig {
                entrypoint: metadata.entrypoint.clone(),
                cmd: metadata.command.clone(),
                working_dir: metadata.working_dir.clone(),
                env: metadata.env_pairs(),
            },
            rootfs: RootFs {
                fs_type: "layers".to_string(),
                diff_ids: layers.iter().map(|layer| layer.diff_id().clone()).collect(),
            },
        }
    }
}

impl Manifest {
    pub fn new(config: Descriptor, layers: &[LayerDescriptor]) -> Self {
        Self {
            schema_version: 2,
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            config,
            layers: layers.iter().map(Descriptor::from).collect(),
        }
    }
}

/// Builds and uploads the image config and manifest
#[derive(Debug, Clone)]
pub struct ManifestAssembler {
    transport: AuthenticatedTransport,
    registry: RegistryConfig,
    output: Logger,
}

impl ManifestAssembler {
    pub fn new(transport: AuthenticatedTransport, registry: RegistryConfig, output: Logger) -> Self {
        Self {
            transport,
            registry,
            output,
        }
    }

    /// Serialize config and manifest. Same inputs, same bytes.
    pub fn assemble(layers: &[LayerDescriptor], metadata: &ImageMetadata) -> Result<AssembledImage> {
        metadata.validate()?;

        let config = serde_json::to_vec(&ImageConfig::new(layers, metadata))?;
        let config_descriptor = Descriptor {
            media_type: CONFIG_MEDIA_TYPE.to_string(),
            digest: Digest::of_bytes(&config),
            size: config.len() as u64,
        };

        let manifest = serde_json::to_vec(&Manifest::new(config_descriptor.clone(), layers))?;
        let manifest_digest = Digest::of_bytes(&manifest);

        Ok(AssembledImage {
            config,
            config_descriptor,
            manifest,
            manifest_digest,
        })
    }

    /// Single-shot upload: `POST .../blobs/uploads/?digest=<digest>` with the body attached
    pub async fn upload_config(&self, image: &AssembledImage) -> Result<()> {
        let mut url = self.registry.blob_uploads_url()?;
        url.query_pairs_mut()
            .append_pair("digest", image.config_descriptor.digest.as_str());

        let request = self
            .transport
            .request(Method::POST, url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.config.clone());

        let response = self.transport.send(request, CONFIG_STEP).await?;
        HttpErrorHandler::expect_status(response, &[StatusCode::CREATED], CONFIG_STEP).await?;

        self.output.detail(&format!(
            "Config blob uploaded: {}",
            image.config_descriptor.digest.short()
        ));
        Ok(())
    }

    pub async fn push_tag(&self, image: &AssembledImage, tag: &str) -> Result<()> {
        let url = self.registry.manifest_url(tag)?;
        let request = self
            .transport
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, MANIFEST_MEDIA_TYPE)
            .body(image.manifest.clone());

        let response = self.transport.send(request, MANIFEST_STEP).await?;
        HttpErrorHandler::expect_status(response, &[StatusCode::CREATED], MANIFEST_STEP).await?;
        Ok(())
    }

    /// Upload the config, then the manifest once per tag.
    ///
    /// Every tag is attempted; failures are collected and reported together.
    pub async fn commit(
        &self,
        layers: &[LayerDescriptor],
        tags: &[String],
        metadata: &ImageMetadata,
    ) -> Result<Digest> {
        ValidationErrorHandler::validate_tags(tags)?;

        let image = Self::assemble(layers, metadata)?;
        self.output.step(&format!(
            "Committing manifest {} ({} layer(s))",
            image.manifest_digest.short(),
            layers.len()
        ));

        self.upload_config(&image).await?;

        let mut failures = Vec::new();
        for tag in tags {
            match self.push_tag(&image, tag).await {
                Ok(()) => self.output.success(&format!(
                    "Pushed {}/{}:{}",
                    self.registry.host(),
                    self.registry.repository,
                    tag
                )),
                Err(err) => {
                    self.output.warning(&format!("Tag {} failed: {}", tag, err));
                    failures.push((tag.clone(), err));
                }
            }
        }

        if failures.is_empty() {
            Ok(image.manifest_digest)
        } else {
            Err(RegistryError::ManifestTags { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(seed: &[u8], size: u64) -> LayerDescriptor {
        LayerDescriptor::new(
            Digest::of_bytes(&[seed, &b"-gz"[..]].concat()),
            Digest::of_bytes(seed),
            size,
        )
    }

    fn metadata() -> ImageMetadata {
        let mut metadata = ImageMetadata::new("amd64", "linux");
        metadata.command = vec!["/bin/sh".to_string(), "-c".to_string(), "run".to_string()];
        metadata.working_dir = Some("/work".to_string());
        metadata.env.insert("PATH".to_string(), "/usr/bin".to_string());
        metadata.env.insert("CI".to_string(), "true".to_string());
        metadata
    }

    #[test]
    fn test_config_layout() {
        let layers = vec![layer(b"one", 10), layer(b"two", 20)];
        let image = ManifestAssembler::assemble(&layers, &metadata()).unwrap();

        let config: serde_json::Value = serde_json::from_slice(&image.config).unwrap();
        assert_eq!(config["architecture"], "amd64");
        assert_eq!(config["os"], "linux");
        assert_eq!(config["config"]["Cmd"][0], "/bin/sh");
        assert_eq!(config["config"]["WorkingDir"], "/work");
        assert_eq!(config["config"]["Env"][0], "CI=true");
        assert_eq!(config["config"]["Env"][1], "PATH=/usr/bin");
        assert!(config["config"].get("Entrypoint").is_none());
        assert_eq!(config["rootfs"]["type"], "layers");
        assert_eq!(config["rootfs"]["diff_ids"][0], layers[0].diff_id().as_str());
        assert_eq!(config["rootfs"]["diff_ids"][1], layers[1].diff_id().as_str());

        assert_eq!(image.config_descriptor.digest, Digest::of_bytes(&image.config));
        assert_eq!(image.config_descriptor.size, image.config.len() as u64);
    }

    #[test]
    fn test_manifest_layout() {
        let layers = vec![layer(b"one", 10), layer(b"two", 20)];
        let image = ManifestAssembler::assemble(&layers, &metadata()).unwrap();

        let manifest: Manifest = serde_json::from_slice(&image.manifest).unwrap();
        assert_eq!(manifest.schema_version, 2);
        assert_eq!(manifest.media_type, MANIFEST_MEDIA_TYPE);
        assert_eq!(manifest.config.media_type, CONFIG_MEDIA_TYPE);
        assert_eq!(manifest.config.digest, image.config_descriptor.digest);
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(&manifest.layers[1].digest, layers[1].digest());
        assert_eq!(manifest.layers[1].size, 20);
        assert_eq!(image.manifest_digest, Digest::of_bytes(&image.manifest));

        let raw: serde_json::Value = serde_json::from_slice(&image.manifest).unwrap();
        assert_eq!(raw["schemaVersion"], 2);
        assert_eq!(raw["layers"][0]["mediaType"], "application/vnd.oci.image.layer.v1.tar+gzip");
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let layers = vec![layer(b"one", 10), layer(b"two", 20)];
        let first = ManifestAssembler::assemble(&layers, &metadata()).unwrap();
        let second = ManifestAssembler::assemble(&layers.clone(), &metadata()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_layer_order_changes_digest() {
        let forward = vec![layer(b"one", 10), layer(b"two", 20)];
        let reversed = vec![layer(b"two", 20), layer(b"one", 10)];
        let a = ManifestAssembler::assemble(&forward, &metadata()).unwrap();
        let b = ManifestAssembler::assemble(&reversed, &metadata()).unwrap();
        assert_ne!(a.manifest_digest, b.manifest_digest);
    }

    #[test]
    fn test_assemble_rejects_incomplete_metadata() {
        let metadata = ImageMetadata::new("", "linux");
        assert!(ManifestAssembler::assemble(&[], &metadata).is_err());
    }
}
