//! Manifest types.
//!
//! This module defines the structs that map to a `halldyll.infra.yaml`
//! manifest. A manifest is purely declarative: it names resources, their
//! attributes and their dependencies, and says nothing about how to reach
//! the desired state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ConfigError;
use crate::graph::{Expr, Lifecycle, Reference, Resource, ResourceId};

/// The root manifest structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Additional immutable attributes per resource type.
    #[serde(default)]
    pub schema: BTreeMap<String, TypeSchemaConfig>,
    /// User variables available as `${var.NAME}`.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Resource declarations, in declaration order.
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
    /// Stack outputs, each a `${<type>.<name>.<output>}` reference.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Target region.
    #[serde(default)]
    pub region: Option<String>,
}

/// Per-type schema extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeSchemaConfig {
    /// Attributes whose change forces replacement.
    #[serde(default)]
    pub immutable: BTreeSet<String>,
}

/// A single resource declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceDecl {
    /// Resource type tag (e.g. `aws.ec2.Subnet`).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Logical name, unique per type.
    pub name: String,
    /// Raw attribute values; strings may hold `${...}` references.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Explicit dependencies, as `<type>.<name>` identifiers.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Desired lifecycle.
    #[serde(default)]
    pub lifecycle: Lifecycle,
    /// Attributes that force replacement for this resource only.
    #[serde(default)]
    pub replace_on_change: BTreeSet<String>,
}

fn default_environment() -> String {
    String::from("dev")
}

impl Manifest {
    /// Returns the variables available for `${var.NAME}` interpolation.
    ///
    /// Builtins `project`, `environment` and `region` (when set) are always
    /// present and take precedence over user variables of the same name.
    #[must_use]
    pub fn variables(&self) -> BTreeMap<String, String> {
        let mut vars = self.variables.clone();
        vars.insert(String::from("project"), self.project.name.clone());
        vars.insert(String::from("environment"), self.project.environment.clone());
        if let Some(region) = &self.project.region {
            vars.insert(String::from("region"), region.clone());
        }
        vars
    }

    /// Converts every declaration into a [`Resource`], in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed references or unknown variables.
    pub fn expand(&self) -> Result<Vec<Resource>, ConfigError> {
        let vars = self.variables();
        self.resources.iter().map(|decl| decl.to_resource(&vars)).collect()
    }

    /// Parses the `outputs` section into references, by output name.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is not a single whole reference after
    /// variable interpolation.
    pub fn exports(&self) -> Result<BTreeMap<String, Reference>, ConfigError> {
        let vars = self.variables();
        self.outputs
            .iter()
            .map(|(name, raw)| match Expr::from_value(&Value::String(raw.clone()), &vars)? {
                Expr::Reference(reference) => Ok((name.clone(), reference)),
                _ => Err(ConfigError::invalid_reference(
                    raw.clone(),
                    format!("output '{name}' must be a single ${{<type>.<name>.<output>}} reference"),
                )),
            })
            .collect()
    }
}

impl ResourceDecl {
    /// Returns the declared identifier.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    /// Builds the resource, turning raw values into expressions.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed references or unknown variables.
    pub fn to_resource(&self, vars: &BTreeMap<String, String>) -> Result<Resource, ConfigError> {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, value)| Expr::from_value(value, vars).map(|expr| (name.clone(), expr)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Resource {
            id: self.id(),
            attributes,
            lifecycle: self.lifecycle,
            replace_on_change: self.replace_on_change.clone(),
        })
    }

    /// Parses the explicit `depends_on` identifiers.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is not `<type>.<name>`.
    pub fn dependencies(&self) -> Result<Vec<ResourceId>, ConfigError> {
        self.depends_on.iter().map(|s| ResourceId::parse(s)).collect()
    }
}
