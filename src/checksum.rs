//! Checksum utilities for conversion-set fingerprints

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// SHA256 checksum of generated content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn of_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Compute checksum of any serialisable value.
    ///
    /// Callers pass ordered structures (`BTreeMap`, `Vec`) so the encoding is stable.
    pub fn of_serialized<T: Serialize>(value: &T) -> Result<Self> {
        let canonical = serde_json::to_vec(value)?;
        Ok(Self::from_bytes(&canonical))
    }

    /// First 12 hex digits, for headers and log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &str) -> bool {
        Self::of_str(content) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
