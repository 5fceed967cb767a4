//! Descriptors for uploaded layers

use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use std::fmt;
use std::str::FromStr;

pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Result of a successful blob upload.
///
/// `digest` and `size` describe the gzip bytes stored by the registry,
/// `diff_id` the uncompressed content referenced from the image config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    media_type: String,
    digest: Digest,
    diff_id: Digest,
    size: u64,
}

impl LayerDescriptor {
    pub fn new(digest: Digest, diff_id: Digest, size: u64) -> Self {
        Self {
            media_type: LAYER_MEDIA_TYPE.to_string(),
            digest,
            diff_id,
            size,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn diff_id(&self) -> &Digest {
        &self.diff_id
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// `<diff-id>|<digest>|<size>`, the form handed between `push-layer` and `commit`
impl fmt::Display for LayerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.diff_id, self.digest, self.size)
    }
}

impl FromStr for LayerDescriptor {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: String| {
            RegistryError::Configuration(format!("invalid layer descriptor {:?}: {}", s, reason))
        };

        let fields: Vec<&str> = s.split('|').collect();
        let [diff_id, digest, size] = fields.as_slice() else {
            return Err(invalid(format!(
                "expected <diff-id>|<digest>|<size>, got {} field(s)",
                fields.len()
            )));
        };

        let diff_id: Digest = diff_id.parse().map_err(|e: RegistryError| invalid(e.to_string()))?;
        let digest: Digest = digest.parse().map_err(|e: RegistryError| invalid(e.to_string()))?;
        let size: u64 = size
            .parse()
            .map_err(|_| invalid(format!("size {:?} is not a non-negative integer", size)))?;

        Ok(Self::new(digest, diff_id, size))
    }
}
