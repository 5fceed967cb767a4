//! OCI Pusher Library
//!
//! Pushes build artifacts to OCI-distribution registries: negotiates Basic or
//! Bearer authentication from the registry's challenge, streams layers as
//! chunked gzip uploads while computing their digests, and commits an OCI image
//! manifest for one or more tags.

pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod image;
pub mod logging;
pub mod registry;
pub mod upload;

pub use config::{AuthConfig, RegistryConfig, UploadConfig};
pub use digest::Digest;
pub use error::{RegistryError, Result};
pub use image::{ImageMetadata, LayerDescriptor};
pub use logging::Logger;
pub use registry::{Credentials, RegistryClient};
