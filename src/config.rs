//! Configuration for registry endpoints, credentials and upload tuning

use crate::error::{RegistryError, Result};
use std::env;
use std::time::Duration;
use url::Url;

/// Default compressed chunk size for PATCH requests (10 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Largest chunk held in memory, whether configured or requested by the registry
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024 * 1024;

/// Environment variables consulted when no credentials are passed explicitly
pub const USERNAME_ENV: &str = "REGISTRY_USERNAME";
pub const PASSWORD_ENV: &str = "REGISTRY_PASSWORD";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Registry base URL, always ending in `/`
    pub base_url: Url,
    pub repository: String,
    pub insecure: bool,
}

impl RegistryConfig {
    /// Normalize a registry host or URL and validate the repository path.
    ///
    /// The scheme is forced to `https` unless `insecure` is set, in which case
    /// an explicit `http://` is kept.
    pub fn parse(registry: &str, repository: &str, insecure: bool) -> Result<Self> {
        let registry = registry.trim().trim_end_matches('/');
        if registry.is_empty() {
            return Err(RegistryError::Configuration("Registry cannot be empty".to_string()));
        }

        let (scheme, host) = match registry.split_once("://") {
            Some(("http", host)) if insecure => ("http", host),
            Some(("http", host)) | Some(("https", host)) => ("https", host),
            Some((other, _)) => {
                return Err(RegistryError::Configuration(format!(
                    "Unsupported registry scheme {:?} in {:?}",
                    other, registry
                )));
            }
            None => ("https", registry),
        };

        if host.is_empty() || host.contains('/') {
            return Err(RegistryError::Configuration(format!(
                "Registry must be a host name with optional port, got {:?}",
                registry
            )));
        }

        let base_url = Url::parse(&format!("{}://{}/", scheme, host))?;
        Self::validate_repository(repository)?;

        Ok(Self {
            base_url,
            repository: repository.to_string(),
            insecure,
        })
    }

    fn validate_repository(repository: &str) -> Result<()> {
        let valid = !repository.is_empty()
            && repository.split('/').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
            });

        if valid {
            Ok(())
        } else {
            Err(RegistryError::Configuration(format!(
                "Invalid repository name {:?}: expected lowercase path segments",
                repository
            )))
        }
    }

    /// Resolve a path (or absolute URL) against the registry base
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// `<registry>/v2/`
    pub fn api_root(&self) -> Result<Url> {
        self.url("v2/")
    }

    /// `<registry>/v2/<repo>/blobs/uploads/`
    pub fn blob_uploads_url(&self) -> Result<Url> {
        self.url(&format!("v2/{}/blobs/uploads/", self.repository))
    }

    /// `<registry>/v2/<repo>/manifests/<tag>`
    pub fn manifest_url(&self, tag: &str) -> Result<Url> {
        self.url(&format!("v2/{}/manifests/{}", self.repository, tag))
    }

    /// Host (and port) for display
    pub fn host(&self) -> String {
        match (self.base_url.host_str(), self.base_url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => self.base_url.to_string(),
        }
    }
}

/// Out-of-band credentials for Basic challenges and token requests
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    /// Explicit values win, the environment fills the gaps
    pub fn resolve(username: Option<String>, password: Option<String>) -> Self {
        Self {
            username: username.or_else(|| env::var(USERNAME_ENV).ok()),
            password: password.or_else(|| env::var(PASSWORD_ENV).ok()),
        }
    }

    pub fn has_auth(&self) -> bool {
        matches!((&self.username, &self.password), (Some(u), Some(p)) if !u.is_empty() && !p.is_empty())
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Starting chunk size; only ever raised by the registry
    pub chunk_size: usize,
    /// gzip level, 0-9
    pub compression_level: u32,
    /// Whole-request timeout applied to every registry call
    pub timeout: Duration,
    /// Compressed segments buffered between compressor and uploader
    pub pipe_depth: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression_level: 6,
            timeout: Duration::from_secs(300),
            pipe_depth: 16,
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RegistryError::Configuration("Chunk size must be greater than 0".to_string()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(RegistryError::Configuration(format!(
                "Chunk size cannot exceed {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.compression_level > 9 {
            return Err(RegistryError::Configuration(format!(
                "Compression level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }
        if self.pipe_depth == 0 {
            return Err(RegistryError::Configuration("Pipe depth must be greater than 0".to_string()));
        }
        Ok(())
    }
}
