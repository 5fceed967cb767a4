//! Registry client façade
//!
//! [`RegistryClient`] ties the authenticated transport, the chunked blob
//! uploader and the manifest assembler together behind the two operations a
//! push needs: upload a layer, commit a manifest for a set of tags.

use crate::config::{AuthConfig, RegistryConfig, UploadConfig};
use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use crate::image::{ImageMetadata, LayerDescriptor, ManifestAssembler};
use crate::logging::Logger;
use crate::registry::auth::{CredentialProvider, Credentials, RegistryProbe};
use crate::registry::transport::{AuthenticatedTransport, build_http_client};
use crate::upload::ChunkedBlobUploader;
use reqwest::Client;
use std::io::Read;

pub struct RegistryClientBuilder {
    registry: RegistryConfig,
    credentials: Option<Credentials>,
    upload: UploadConfig,
    http_client: Option<Client>,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(registry: RegistryConfig) -> Self {
        Self {
            registry,
            credentials: None,
            upload: UploadConfig::default(),
            http_client: None,
            output: Logger::new_quiet(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_upload_config(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    /// Reuse a client, e.g. the one that ran the probe
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        self.upload.validate()?;

        let credentials = self.credentials.ok_or_else(|| {
            RegistryError::Configuration("Registry client requires credentials".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => build_http_client(self.upload.timeout)?,
        };

        let transport = AuthenticatedTransport::new(http_client, credentials);
        let uploader = ChunkedBlobUploader::new(
            transport.clone(),
            self.registry.clone(),
            self.upload,
            self.output.clone(),
        )?;
        let manifests = ManifestAssembler::new(transport.clone(), self.registry.clone(), self.output.clone());

        Ok(RegistryClient {
            registry: self.registry,
            transport,
            uploader,
            manifests,
            output: self.output,
        })
    }
}

pub struct RegistryClient {
    registry: RegistryConfig,
    transport: AuthenticatedTransport,
    uploader: ChunkedBlobUploader,
    manifests: ManifestAssembler,
    output: Logger,
}

impl RegistryClient {
    pub fn builder(registry: RegistryConfig) -> RegistryClientBuilder {
        RegistryClientBuilder::new(registry)
    }

    /// Probe the registry, obtain credentials and build a client in one go
    pub async fn connect(
        registry: RegistryConfig,
        auth: AuthConfig,
        upload: UploadConfig,
        output: Logger,
    ) -> Result<Self> {
        upload.validate()?;
        let http_client = build_http_client(upload.timeout)?;

        let provider = CredentialProvider::new(http_client.clone(), auth, output.clone())
            .with_repository(registry.repository.clone());
        let probe = RegistryProbe::new(http_client.clone(), registry.clone(), output.clone());
        let credentials = probe.probe(&provider).await?;

        output.info(&format!(
            "Authenticated to {} using {}",
            registry.host(),
            credentials.scheme()
        ));

        Self::builder(registry)
            .with_credentials(credentials)
            .with_upload_config(upload)
            .with_http_client(http_client)
            .with_logger(output)
            .build()
    }

    pub fn registry(&self) -> &RegistryConfig {
        &self.registry
    }

    pub fn credentials(&self) -> &Credentials {
        self.transport.credentials()
    }

    /// Stream `content` to the registry as a gzip layer
    pub async fn upload_layer<R>(&self, content: R) -> Result<LayerDescriptor>
    where
        R: Read + Send + 'static,
    {
        let layer = self.uploader.upload(content).await?;
        self.output.step(&format!(
            "Layer {} ({})",
            layer.digest().short(),
            self.output.format_size(layer.size())
        ));
        Ok(layer)
    }

    /// Upload the image config and a manifest for each tag; returns the manifest digest
    pub async fn commit_manifest(
        &self,
        layers: &[LayerDescriptor],
        tags: &[String],
        metadata: &ImageMetadata,
    ) -> Result<Digest> {
        self.manifests.commit(layers, tags, metadata).await
    }
}
