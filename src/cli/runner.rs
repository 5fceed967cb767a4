//! Runner executing parsed CLI commands

use crate::cli::args::{Args, Command, Target};
use crate::config::{AuthConfig, RegistryConfig, UploadConfig};
use crate::digest::Digest;
use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use crate::image::{ImageMetadataSource, JsonFileMetadataSource, LayerDescriptor};
use crate::logging::Logger;
use crate::registry::RegistryClient;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };

        Self { args, output }
    }

    pub fn logger(&self) -> &Logger {
        &self.output
    }

    pub async fn run(&self) -> Result<()> {
        self.validate_arguments()?;

        match &self.args.command {
            Command::PushLayer { target, files } => {
                let client = self.connect(target).await?;
                self.push_layers(&client, files).await?;
            }
            Command::Commit {
                target,
                tags,
                layers,
                metadata,
            } => {
                // Descriptor strings are checked before touching the network.
                let layers = layers
                    .iter()
                    .map(|raw| raw.parse::<LayerDescriptor>())
                    .collect::<Result<Vec<_>>>()?;
                let client = self.connect(target).await?;
                let digest = self.commit(&client, &layers, tags, metadata).await?;
                self.print_summary(&client, &layers, tags, &digest);
            }
            Command::Push {
                target,
                tags,
                metadata,
                files,
            } => {
                let client = self.connect(target).await?;
                let layers = self.push_layers(&client, files).await?;
                let digest = self.commit(&client, &layers, tags, metadata).await?;
                self.print_summary(&client, &layers, tags, &digest);
            }
        }

        self.output.success(&format!(
            "Done in {}",
            self.output.format_duration(self.output.elapsed())
        ));
        Ok(())
    }

    fn validate_arguments(&self) -> Result<()> {
        let auth = self.auth_config();
        ValidationErrorHandler::validate_credentials(&auth.username, &auth.password)?;
        ValidationErrorHandler::validate_timeout(self.args.timeout)?;
        self.upload_config().validate()?;

        if let Command::Commit { tags, .. } | Command::Push { tags, .. } = &self.args.command {
            ValidationErrorHandler::validate_tags(tags)?;
        }

        if let Command::PushLayer { files, .. } | Command::Push { files, .. } = &self.args.command {
            for file in files {
                if !file.is_file() {
                    return Err(RegistryError::Configuration(format!(
                        "Layer file does not exist: {}",
                        file.display()
                    )));
                }
            }
        }

        Ok(())
    }

    fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            chunk_size: self.args.chunk_size,
            compression_level: self.args.compression_level,
            timeout: Duration::from_secs(self.args.timeout),
            ..UploadConfig::default()
        }
    }

    fn auth_config(&self) -> AuthConfig {
        AuthConfig::resolve(self.args.username.clone(), self.args.password.clone())
    }

    async fn connect(&self, target: &Target) -> Result<RegistryClient> {
        let registry = RegistryConfig::parse(&target.registry, &target.repository, self.args.insecure)?;
        self.output.section(&format!("{}/{}", registry.host(), registry.repository));

        RegistryClient::connect(registry, self.auth_config(), self.upload_config(), self.output.clone()).await
    }

    async fn push_layers(&self, client: &RegistryClient, files: &[PathBuf]) -> Result<Vec<LayerDescriptor>> {
        let mut layers = Vec::with_capacity(files.len());

        for (i, path) in files.iter().enumerate() {
            self.output.step(&format!(
                "Uploading layer {}/{}: {}",
                i + 1,
                files.len(),
                path.display()
            ));

            let file = open_layer(path)?;
            let layer = client.upload_layer(file).await?;
            self.output.result(&layer.to_string());
            layers.push(layer);
        }

        Ok(layers)
    }

    async fn commit(
        &self,
        client: &RegistryClient,
        layers: &[LayerDescriptor],
        tags: &[String],
        metadata: &Path,
    ) -> Result<Digest> {
        let metadata = JsonFileMetadataSource::new(metadata).image_metadata().await?;
        self.output.detail(&format!(
            "Image platform: {}/{}",
            metadata.os, metadata.architecture
        ));
        client.commit_manifest(layers, tags, &metadata).await
    }

    fn print_summary(&self, client: &RegistryClient, layers: &[LayerDescriptor], tags: &[String], digest: &Digest) {
        let total: u64 = layers.iter().map(LayerDescriptor::size).sum();
        self.output.summary_kv(
            "Push summary",
            &[
                ("Repository", format!("{}/{}", client.registry().host(), client.registry().repository)),
                ("Tags", tags.join(", ")),
                ("Layers", layers.len().to_string()),
                ("Compressed size", self.output.format_size(total)),
                ("Manifest", digest.to_string()),
            ],
        );
        self.output.result(digest.as_str());
    }
}

fn open_layer(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        RegistryError::Configuration(format!("Cannot open layer {}: {}", path.display(), e))
    })
}
