//! Error types and handlers for registry operations

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Bad or missing input detected before anything is sent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed, unsupported or absent `WWW-Authenticate` challenge
    #[error("Authentication challenge error: {0}")]
    Challenge(String),

    /// Token endpoint rejected us or answered with garbage
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Registry answered a step with an unexpected status code
    #[error("{step}: unexpected status {status}{}", format_body(.body))]
    Protocol {
        step: &'static str,
        status: u16,
        body: String,
    },

    /// The HTTP client failed before a response arrived
    #[error("{step}: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Reading or compressing the layer source failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// One or more tags could not be pushed
    #[error("failed to push manifest for {}", describe_tag_failures(.failures))]
    ManifestTags { failures: Vec<(String, RegistryError)> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistryError {
    /// Step name for protocol and transport errors
    pub fn step(&self) -> Option<&'static str> {
        match self {
            RegistryError::Protocol { step, .. } | RegistryError::Transport { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Tags that failed, for a `ManifestTags` error
    pub fn failed_tags(&self) -> Vec<&str> {
        match self {
            RegistryError::ManifestTags { failures } => {
                failures.iter().map(|(tag, _)| tag.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Configuration(format!("invalid URL: {}", err))
    }
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {}", body)
    }
}

fn describe_tag_failures(failures: &[(String, RegistryError)]) -> String {
    failures
        .iter()
        .map(|(tag, err)| format!("tag {:?} ({})", tag, err))
        .collect::<Vec<_>>()
        .join(", ")
}
