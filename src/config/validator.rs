//! Manifest validation.
//!
//! This module checks a manifest for naming, reference and secret-handling
//! mistakes before any graph is built, reporting every problem at once.

use crate::error::{ConfigError, InfraError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::spec::{Manifest, ProjectConfig, ResourceDecl};
use crate::graph::{Expr, Lifecycle, ResourceId};

/// Attribute name fragments that mark secret material.
const SENSITIVE_ATTRIBUTE_MARKERS: &[&str] = &["password", "secret", "token", "private_key", "access_key"];

/// Validator for infrastructure manifests.
#[derive(Debug, Default)]
pub struct ManifestValidator {
    /// Extra attribute name fragments treated as sensitive.
    sensitive_markers: Vec<String>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ManifestValidator {
    /// Creates a validator with the default sensitive attribute markers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sensitive_markers: Vec::new(),
        }
    }

    /// Treats attributes whose name contains `marker` as sensitive.
    pub fn add_sensitive_marker(&mut self, marker: impl Into<String>) {
        self.sensitive_markers.push(marker.into().to_ascii_lowercase());
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let result = self.check(manifest);

        if result.errors.is_empty() {
            debug!("Manifest validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(InfraError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    /// Runs every check and returns all findings without failing.
    #[must_use]
    pub fn check(&self, manifest: &Manifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(&manifest.project, &mut result);
        Self::validate_schema(manifest, &mut result);
        self.validate_resources(manifest, &mut result);
        Self::validate_outputs(manifest, &mut result);

        result
    }

    /// Validates project configuration.
    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.error("project.name", "Project name cannot be empty");
        } else if !is_valid_name(&project.name) {
            result.error(
                "project.name",
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            );
        }

        if project.environment.is_empty() {
            result.error("project.environment", "Environment cannot be empty");
        }

        if project.region.as_deref().is_some_and(str::is_empty) {
            result.error("project.region", "Region cannot be empty when set");
        }
    }

    /// Validates the schema extension section.
    fn validate_schema(manifest: &Manifest, result: &mut ValidationResult) {
        for (resource_type, schema) in &manifest.schema {
            let field = format!("schema.{resource_type}");
            if !is_valid_type(resource_type) {
                result.error(&field, format!("Invalid resource type '{resource_type}'"));
            }
            if schema.immutable.iter().any(String::is_empty) {
                result.error(format!("{field}.immutable"), "Attribute names cannot be empty");
            }
            if !manifest.resources.iter().any(|r| &r.resource_type == resource_type) {
                result
                    .warnings
                    .push(format!("Schema entry for '{resource_type}' matches no declared resource"));
            }
        }
    }

    /// Validates resource declarations.
    fn validate_resources(&self, manifest: &Manifest, result: &mut ValidationResult) {
        if manifest.resources.is_empty() {
            result.warnings.push(String::from("No resources declared"));
            return;
        }

        let declared: HashSet<ResourceId> = manifest.resources.iter().map(ResourceDecl::id).collect();
        let vars = manifest.variables();
        let mut seen: HashSet<ResourceId> = HashSet::new();

        for (i, decl) in manifest.resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if !is_valid_type(&decl.resource_type) {
                result.error(
                    format!("{prefix}.type"),
                    format!(
                        "Resource type '{}' is invalid. Must be dot-separated alphanumeric segments.",
                        decl.resource_type
                    ),
                );
            }

            if !is_valid_resource_name(&decl.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!(
                        "Resource name '{}' is invalid. Must start with a letter and contain only alphanumerics, hyphens or underscores.",
                        decl.name
                    ),
                );
            }

            let id = decl.id();
            if !seen.insert(id.clone()) {
                result.error(format!("{prefix}.name"), format!("Duplicate resource '{id}'"));
            }

            Self::validate_attributes(decl, &prefix, &vars, &declared, result);
            Self::validate_depends_on(decl, &prefix, &declared, result);
            self.validate_secrets(decl, &prefix, &vars, result);

            for attr in &decl.replace_on_change {
                if !decl.attributes.contains_key(attr) {
                    result.warnings.push(format!(
                        "{prefix}.replace_on_change: '{attr}' is not an attribute of {id}"
                    ));
                }
            }
        }
    }

    /// Checks reference syntax, variables and reference targets.
    fn validate_attributes(
        decl: &ResourceDecl,
        prefix: &str,
        vars: &BTreeMap<String, String>,
        declared: &HashSet<ResourceId>,
        result: &mut ValidationResult,
    ) {
        for (name, value) in &decl.attributes {
            let field = format!("{prefix}.attributes.{name}");
            match Expr::from_value(value, vars) {
                Ok(expr) => {
                    for reference in expr.references() {
                        if !declared.contains(&reference.resource) {
                            result.error(
                                &field,
                                format!("Reference {reference} points at undeclared resource"),
                            );
                        }
                    }
                }
                Err(e) => result.error(&field, e.to_string()),
            }
        }
    }

    /// Checks explicit dependency entries.
    fn validate_depends_on(
        decl: &ResourceDecl,
        prefix: &str,
        declared: &HashSet<ResourceId>,
        result: &mut ValidationResult,
    ) {
        let own = decl.id();
        for (j, dep) in decl.depends_on.iter().enumerate() {
            let field = format!("{prefix}.depends_on[{j}]");
            match ResourceId::parse(dep) {
                Ok(dep_id) if dep_id == own => {
                    result.error(&field, format!("{own} cannot depend on itself"));
                }
                Ok(dep_id) if !declared.contains(&dep_id) => {
                    result.error(&field, format!("Dependency {dep_id} is not declared"));
                }
                Ok(_) => {}
                Err(e) => result.error(&field, e.to_string()),
            }
        }
    }

    /// Checks that every stack output is a single reference to a declared,
    /// present resource.
    fn validate_outputs(manifest: &Manifest, result: &mut ValidationResult) {
        let vars = manifest.variables();
        for (name, raw) in &manifest.outputs {
            let field = format!("outputs.{name}");
            match Expr::from_value(&Value::String(raw.clone()), &vars) {
                Ok(Expr::Reference(reference)) => {
                    match manifest.resources.iter().find(|d| d.id() == reference.resource) {
                        None => result.error(&field, format!("Output {reference} points at undeclared resource")),
                        Some(decl) if decl.lifecycle == Lifecycle::Absent => result.error(
                            &field,
                            format!("Output {reference} points at a resource declared absent"),
                        ),
                        Some(_) => {}
                    }
                }
                Ok(_) => result.error(&field, "Output must be a single ${<type>.<name>.<output>} reference"),
                Err(e) => result.error(&field, e.to_string()),
            }
        }
    }

    /// Rejects literal values in attributes that hold secret material.
    fn validate_secrets(
        &self,
        decl: &ResourceDecl,
        prefix: &str,
        vars: &BTreeMap<String, String>,
        result: &mut ValidationResult,
    ) {
        for (name, value) in &decl.attributes {
            self.scan_secret_literals(&format!("{prefix}.attributes.{name}"), name, value, vars, result);
        }
    }

    /// Sensitive strings are judged after `${var.NAME}` interpolation, so a
    /// variable cannot smuggle a literal secret past the check.
    fn scan_secret_literals(
        &self,
        field: &str,
        key: &str,
        value: &Value,
        vars: &BTreeMap<String, String>,
        result: &mut ValidationResult,
    ) {
        match value {
            Value::String(_) if self.is_sensitive(key) => {
                // Malformed values are reported by the attribute check.
                match Expr::from_value(value, vars) {
                    Ok(Expr::Literal(Value::String(literal))) if !literal.is_empty() => result.error(
                        field,
                        format!("Attribute '{key}' holds a literal secret; use {{ secret: NAME }} instead"),
                    ),
                    _ => {}
                }
            }
            Value::Object(map) if map.len() == 1 && map.get("secret").is_some_and(Value::is_string) => {}
            Value::Object(map) => {
                for (k, v) in map {
                    self.scan_secret_literals(&format!("{field}.{k}"), k, v, vars, result);
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    self.scan_secret_literals(&format!("{field}[{i}]"), key, v, vars, result);
                }
            }
            _ => {}
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        SENSITIVE_ATTRIBUTE_MARKERS.iter().any(|m| key.contains(m))
            || self.sensitive_markers.iter().any(|m| key.contains(m.as_str()))
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    // Rest must be lowercase alphanumeric or hyphen
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

/// Resource names: a letter, then alphanumerics, hyphens or underscores.
/// Dots are reserved as the type/name separator.
fn is_valid_resource_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Resource types: non-empty dot-separated alphanumeric segments.
fn is_valid_type(resource_type: &str) -> bool {
    !resource_type.is_empty()
        && resource_type
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
