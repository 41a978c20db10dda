//! Spec hashing for change detection.
//!
//! Hashes are SHA-256 over the canonical JSON encoding; JSON object keys
//! are ordered, so equal specs always hash the same.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{FleetError, Result};

use super::spec::DeploymentManifest;

/// Hasher for manifests and job specs.
#[derive(Debug, Default)]
pub struct SpecHasher;

impl SpecHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hashes any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded as JSON.
    pub fn hash<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| FleetError::internal(format!("Failed to encode spec for hashing: {e}")))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Hashes a whole manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be encoded.
    pub fn hash_manifest(&self, manifest: &DeploymentManifest) -> Result<String> {
        self.hash(manifest)
    }

    /// First 8 characters of a hash, for display.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
