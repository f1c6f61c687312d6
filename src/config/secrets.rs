//! Secret injection.
//!
//! Manifests name secrets (`{ secret: DB_PASSWORD }`); the values come from a
//! [`SecretSource`] supplied by the embedding application.

use std::collections::BTreeMap;
use std::fmt;

/// Environment variable holding the key for secret fingerprints.
pub const FINGERPRINT_KEY_VAR: &str = "HALLDYLL_FINGERPRINT_KEY";

/// A source of secret values, looked up by name.
pub trait SecretSource: fmt::Debug + Send + Sync {
    /// Returns the secret value, or `None` if the source does not hold it.
    fn resolve(&self, name: &str) -> Option<String>;

    /// Returns the key used to fingerprint secrets recorded in plans and
    /// state. Without one, fingerprints are plain SHA-256 digests.
    fn fingerprint_key(&self) -> Option<String> {
        None
    }
}

/// Reads secrets from process environment variables, optionally prefixed.
///
/// Combine with [`crate::config::ManifestParser::load_dotenv`] to source
/// them from a `.env` file.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretSource {
    prefix: String,
}

impl EnvSecretSource {
    /// Creates a source reading variables by their bare name.
    #[must_use]
    pub const fn new() -> Self {
        Self { prefix: String::new() }
    }

    /// Creates a source reading `<prefix><name>`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl SecretSource for EnvSecretSource {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}{name}", self.prefix)).ok()
    }

    fn fingerprint_key(&self) -> Option<String> {
        std::env::var(FINGERPRINT_KEY_VAR).ok().filter(|k| !k.is_empty())
    }
}

/// An in-memory secret map, for callers that fetch secrets themselves.
#[derive(Default, Clone)]
pub struct StaticSecretSource {
    values: BTreeMap<String, String>,
    fingerprint_key: Option<String>,
}

impl StaticSecretSource {
    /// Creates an empty source.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            fingerprint_key: None,
        }
    }

    /// Adds a secret.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Sets the key used to fingerprint secrets.
    #[must_use]
    pub fn with_fingerprint_key(mut self, key: impl Into<String>) -> Self {
        self.fingerprint_key = Some(key.into());
        self
    }
}

// Values are never printed.
impl fmt::Debug for StaticSecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSecretSource")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .field("keyed", &self.fingerprint_key.is_some())
            .finish()
    }
}

impl SecretSource for StaticSecretSource {
    fn resolve(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn fingerprint_key(&self) -> Option<String> {
        self.fingerprint_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_resolves_known_names() {
        let source = StaticSecretSource::new().with("DB_PASSWORD", "s3cr3t");
        assert_eq!(source.resolve("DB_PASSWORD").as_deref(), Some("s3cr3t"));
        assert_eq!(source.resolve("OTHER"), None);
    }

    #[test]
    fn test_static_source_debug_hides_values() {
        let source = StaticSecretSource::new()
            .with("DB_PASSWORD", "s3cr3t")
            .with_fingerprint_key("k3y-material");
        let debug = format!("{source:?}");
        assert!(debug.contains("DB_PASSWORD"));
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("k3y-material"));
    }

    #[test]
    fn test_fingerprint_key_is_opt_in() {
        assert_eq!(StaticSecretSource::new().fingerprint_key(), None);
        let keyed = StaticSecretSource::new().with_fingerprint_key("k");
        assert_eq!(keyed.fingerprint_key().as_deref(), Some("k"));
    }

    #[test]
    fn test_env_source_missing_variable() {
        let source = EnvSecretSource::with_prefix("HALLDYLL_TEST_SECRET_THAT_IS_NOT_SET_");
        assert_eq!(source.resolve("X"), None);
    }

    #[test]
    fn test_env_source_reads_path() {
        // PATH is set in every test environment.
        let source = EnvSecretSource::new();
        assert!(source.resolve("PATH").is_some());
    }
}
