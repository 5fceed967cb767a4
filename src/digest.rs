//! SHA256 digest utilities for OCI content addressing
//!
//! Digests are always carried as `sha256:<64 lowercase hex>`. Layer digests are
//! accumulated incrementally while bytes stream past, so nothing here ever needs
//! a buffered copy of a blob.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

pub const SHA256_PREFIX: &str = "sha256:";

/// Content digest in `<algorithm>:<hex>` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// Digest of a complete in-memory buffer (configs and manifests only)
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = DigestHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex part without the algorithm prefix
    pub fn hex(&self) -> &str {
        &self.0[SHA256_PREFIX.len()..]
    }

    /// Truncated form for log lines
    pub fn short(&self) -> &str {
        &self.0[..SHA256_PREFIX.len() + 12]
    }

    pub fn is_valid_sha256_hex(hex: &str) -> bool {
        hex.len() == 64 && hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.strip_prefix(SHA256_PREFIX).ok_or_else(|| {
            RegistryError::Configuration(format!("digest {:?} is missing the sha256: prefix", s))
        })?;

        if !Self::is_valid_sha256_hex(hex) {
            return Err(RegistryError::Configuration(format!(
                "digest {:?} must have 64 lowercase hex characters",
                s
            )));
        }

        Ok(Digest(s.to_string()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA256 accumulator
#[derive(Default, Clone)]
pub struct DigestHasher {
    inner: Sha256,
    bytes: u64,
}

impl DigestHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> Digest {
        Digest(format!("{}{}", SHA256_PREFIX, hex::encode(self.inner.finalize())))
    }
}

/// Reader adapter that hashes everything read through it
pub struct HashingReader<R> {
    inner: R,
    hasher: DigestHasher,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: DigestHasher::new(),
        }
    }

    pub fn finalize(self) -> (Digest, u64) {
        let bytes = self.hasher.bytes();
        (self.hasher.finalize(), bytes)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
