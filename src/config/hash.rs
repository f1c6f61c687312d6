//! Deterministic hashing for plans, manifests and secret material.
//!
//! Secrets never reach state in clear text: only their fingerprint is
//! recorded, so drift in a secret can be detected without storing it. When
//! a fingerprint key is available the fingerprint is an HMAC, so a leaked
//! state file cannot be used to test guesses offline.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::spec::Manifest;
use crate::graph::Lifecycle;

/// Prefix carried by unkeyed secret fingerprints.
pub const FINGERPRINT_PREFIX: &str = "sha256:";

/// Prefix carried by keyed secret fingerprints.
pub const HMAC_PREFIX: &str = "hmac-sha256:";

type HmacSha256 = Hmac<Sha256>;

/// Hasher for computing fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fingerprinter;

impl Fingerprinter {
    /// Creates a new fingerprinter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hashes raw bytes and returns the lowercase hex digest.
    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Fingerprints a secret value as `sha256:<hex>`.
    #[must_use]
    pub fn fingerprint_secret(&self, value: &str) -> String {
        format!("{FINGERPRINT_PREFIX}{}", self.hash_bytes(value.as_bytes()))
    }

    /// Fingerprints a secret value with a keyed HMAC as `hmac-sha256:<hex>`.
    ///
    /// Falls back to [`Self::fingerprint_secret`] when no key is given.
    #[must_use]
    pub fn fingerprint_secret_keyed(&self, key: Option<&str>, value: &str) -> String {
        let Some(key) = key else {
            return self.fingerprint_secret(value);
        };
        match HmacSha256::new_from_slice(key.as_bytes()) {
            Ok(mut mac) => {
                mac.update(value.as_bytes());
                format!("{HMAC_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
            }
            Err(_) => self.fingerprint_secret(value),
        }
    }

    /// Hashes a whole manifest.
    ///
    /// Attribute maps are ordered, so the same manifest always hashes the
    /// same regardless of how its YAML keys were laid out.
    #[must_use]
    pub fn hash_manifest(&self, manifest: &Manifest) -> String {
        let mut hasher = Sha256::new();

        hasher.update(manifest.project.name.as_bytes());
        hasher.update(manifest.project.environment.as_bytes());
        if let Some(region) = &manifest.project.region {
            hasher.update(region.as_bytes());
        }

        for (resource_type, schema) in &manifest.schema {
            hasher.update(resource_type.as_bytes());
            for attr in &schema.immutable {
                hasher.update(attr.as_bytes());
            }
        }

        for decl in &manifest.resources {
            // Field separator keeps ("ab", "c") distinct from ("a", "bc").
            hasher.update(decl.resource_type.as_bytes());
            hasher.update([0u8]);
            hasher.update(decl.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(serde_json::to_string(&decl.attributes).unwrap_or_default());
            for dep in &decl.depends_on {
                hasher.update(dep.as_bytes());
            }
            hasher.update(if decl.lifecycle == Lifecycle::Absent { [1u8] } else { [0u8] });
            for attr in &decl.replace_on_change {
                hasher.update(attr.as_bytes());
            }
        }

        for (name, reference) in &manifest.outputs {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(reference.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters of the digest) for display.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.strip_prefix(HMAC_PREFIX)
            .or_else(|| hash.strip_prefix(FINGERPRINT_PREFIX))
            .unwrap_or(hash)
            .chars()
            .take(8)
            .collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        // Use constant-time comparison to avoid timing attacks
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
