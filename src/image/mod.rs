//! OCI image documents
//!
//! This module provides the types that describe what gets pushed: layer
//! descriptors produced by blob uploads, image metadata from the build platform,
//! and the [`ManifestAssembler`] that turns both into an OCI image config and
//! manifest.
//!
//! # Examples
//!
//! Assembling the documents without uploading them:
//!
//! ```
//! use oci_pusher::image::{ImageMetadata, LayerDescriptor, ManifestAssembler};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let layer: LayerDescriptor = concat!(
//!     "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9|",
//!     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855|",
//!     "42"
//! )
//! .parse()?;
//! let image = ManifestAssembler::assemble(&[layer], &ImageMetadata::new("amd64", "linux"))?;
//! assert!(image.manifest_digest.as_str().starts_with("sha256:"));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod layer;
pub mod manifest;
pub mod metadata;

pub use layer::{LAYER_MEDIA_TYPE, LayerDescriptor};
pub use manifest::{
    AssembledImage, CONFIG_MEDIA_TYPE, Descriptor, ImageConfig, MANIFEST_MEDIA_TYPE, Manifest, ManifestAssembler,
};
pub use metadata::{ImageMetadata, ImageMetadataSource, JsonFileMetadataSource};
