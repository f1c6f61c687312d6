//! Manifest module for the Halldyll infrastructure planner.
//!
//! This module handles all manifest-related functionality:
//! - Parsing and deserializing `halldyll.infra.yaml`
//! - Validation of names, references and secret handling
//! - Secret injection from external sources
//! - Computing fingerprints for change detection

mod hash;
mod parser;
mod secrets;
mod spec;
mod validator;

pub use hash::{FINGERPRINT_PREFIX, Fingerprinter, HMAC_PREFIX};
pub use parser::{DEFAULT_MANIFEST_FILES, ManifestParser, find_manifest_file};
pub use secrets::{EnvSecretSource, FINGERPRINT_KEY_VAR, SecretSource, StaticSecretSource};
pub use spec::{Manifest, ProjectConfig, ResourceDecl, TypeSchemaConfig};
pub use validator::{ManifestValidator, ValidationError, ValidationResult};
