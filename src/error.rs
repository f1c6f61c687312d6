//! Error types for the Halldyll infrastructure planner.
//!
//! This module provides the error hierarchy for every stage of the planning
//! lifecycle: manifest loading, graph construction, diffing, state snapshots
//! and plan execution.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::graph::ResourceId;

/// The main error type for the infrastructure planner.
#[derive(Debug, Error)]
pub enum InfraError {
    /// Manifest-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dependency graph errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// State snapshot errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Plan execution errors.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Manifest-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Manifest validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A resource identifier or reference expression is malformed.
    #[error("Invalid reference '{expression}': {reason}")]
    InvalidReference {
        /// The offending expression.
        expression: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A `${var.NAME}` placeholder names an undefined variable.
    #[error("Unknown variable '{name}' in '{expression}'")]
    UnknownVariable {
        /// Variable name.
        name: String,
        /// The string that contained it.
        expression: String,
    },
}

/// Dependency graph errors. All of them are fatal at plan-construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A resource with the same identifier is already registered.
    #[error("Duplicate resource: {id}")]
    DuplicateResource {
        /// The duplicated identifier.
        id: ResourceId,
    },

    /// A link or reference targets a resource that was never registered.
    #[error("Unknown resource: {id}{}", format_referrer(.referenced_by))]
    UnknownResource {
        /// The missing identifier.
        id: ResourceId,
        /// The resource holding the dangling link, if any.
        referenced_by: Option<ResourceId>,
    },

    /// A resource identifier cannot be rendered as `<type>.<name>` and
    /// parsed back to the same identifier.
    #[error("Invalid resource identifier (type '{resource_type}', name '{name}'): {reason}")]
    InvalidIdentifier {
        /// Declared type tag.
        resource_type: String,
        /// Declared name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The dependency graph contains a cycle.
    #[error("Cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// Cycle path; the first element is repeated at the end.
        cycle: Vec<ResourceId>,
    },
}

/// Planning errors raised while diffing desired against prior state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Prior and desired values of an attribute have incompatible types.
    #[error("Cannot diff {id}.{attribute}: prior value is {prior_kind}, desired value is {desired_kind}")]
    IncompatibleAttribute {
        /// Resource being diffed.
        id: ResourceId,
        /// Attribute name.
        attribute: String,
        /// Kind of the prior value.
        prior_kind: &'static str,
        /// Kind of the desired value.
        desired_kind: &'static str,
    },

    /// A present resource depends on a resource declared absent.
    #[error("{id} depends on {dependency}, which is declared absent")]
    DependsOnAbsent {
        /// The dependent resource.
        id: ResourceId,
        /// The absent dependency.
        dependency: ResourceId,
    },

    /// An exported output points at a resource declared absent.
    #[error("Output '{output}' references {id}, which is declared absent")]
    OutputOfAbsent {
        /// Output name.
        output: String,
        /// The absent resource.
        id: ResourceId,
    },

    /// A secret could not be supplied by the secret source.
    #[error("Secret '{name}' required by {id} is not available")]
    MissingSecret {
        /// Resource requiring the secret.
        id: ResourceId,
        /// Secret name.
        name: String,
    },

    /// The plan no longer matches the fingerprint it was approved with.
    #[error("Plan fingerprint mismatch: expected {expected}, found {found}")]
    StalePlan {
        /// Fingerprint the caller approved.
        expected: String,
        /// Fingerprint of the current plan.
        found: String,
    },
}

/// State snapshot errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Snapshot is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Snapshot version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors raised while executing a plan against a provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The provider rejected an operation.
    #[error("Provider failed on {id}: {message}")]
    Provider {
        /// Target resource.
        id: ResourceId,
        /// Provider message.
        message: String,
    },

    /// The provider did not answer in time.
    #[error("Operation on {id} timed out after {after:?}")]
    Timeout {
        /// Target resource.
        id: ResourceId,
        /// Configured limit.
        after: Duration,
    },

    /// A deferred reference had no realized value when the entry ran.
    #[error("Unresolved reference {reference} in {id}")]
    UnresolvedReference {
        /// Resource holding the reference.
        id: ResourceId,
        /// The reference expression.
        reference: String,
    },

    /// A secret vanished between planning and execution.
    #[error("Secret '{name}' required by {id} is not available")]
    MissingSecret {
        /// Resource requiring the secret.
        id: ResourceId,
        /// Secret name.
        name: String,
    },

    /// Execution was aborted.
    #[error("Execution aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Error returned by a [`crate::planner::Provider`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    /// Description of the failure.
    pub message: String,
    /// Whether retrying the same operation may succeed.
    pub retryable: bool,
}

/// Result type alias for planner operations.
pub type Result<T> = std::result::Result<T, InfraError>;

fn format_referrer(referenced_by: &Option<ResourceId>) -> String {
    referenced_by
        .as_ref()
        .map(|r| format!(" (referenced by {r})"))
        .unwrap_or_default()
}

fn format_cycle(cycle: &[ResourceId]) -> String {
    let mut out = String::new();
    for (i, id) in cycle.iter().enumerate() {
        if i > 0 {
            out.push_str(" -> ");
        }
        let _ = write!(out, "{id}");
    }
    out
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates an invalid reference error.
    #[must_use]
    pub fn invalid_reference(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a non-retryable provider error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a retryable provider error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}
