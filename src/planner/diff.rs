//! Diff engine for comparing desired attributes against prior state.
//!
//! The engine works on already-evaluated attributes: literals and secrets
//! are known, references are either resolved from prior outputs or still
//! deferred. A deferred value always counts as a change because nothing
//! proves it will equal what was applied before.

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::PlanError;
use crate::graph::{Evaluated, Reference, Resource};
use crate::state::ResourceState;

use super::plan::Operation;
use super::schema::Schema;

/// Engine for computing attribute diffs.
#[derive(Debug)]
pub struct DiffEngine<'a> {
    /// Replacement schema.
    schema: &'a Schema,
}

/// New value of a changed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DiffValue {
    /// Value known at plan time.
    Known(Value),
    /// Value known only once the referenced resource is applied.
    Unknown(Reference),
    /// Attribute no longer declared.
    Removed,
}

/// Written in place of sensitive values when a change is serialized.
const REDACTED: &str = "(sensitive)";

/// A single attribute difference.
///
/// Serializes with sensitive known values replaced by `"(sensitive)"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Attribute name.
    pub name: String,
    /// Prior value, if the attribute existed.
    pub before: Option<Value>,
    /// Desired value.
    pub after: DiffValue,
    /// Whether this change cannot be applied in place.
    pub forces_replacement: bool,
    /// Whether the values are secret fingerprints.
    pub sensitive: bool,
}

impl Serialize for AttributeChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AttributeChange", 5)?;
        state.serialize_field("name", &self.name)?;
        match (&self.before, self.sensitive) {
            (None, _) => state.skip_field("before")?,
            (Some(_), true) => state.serialize_field("before", REDACTED)?,
            (Some(v), false) => state.serialize_field("before", v)?,
        }
        match (&self.after, self.sensitive) {
            (DiffValue::Known(_), true) => {
                state.serialize_field("after", &DiffValue::Known(Value::String(String::from(REDACTED))))?;
            }
            (after, _) => state.serialize_field("after", after)?,
        }
        state.serialize_field("forces_replacement", &self.forces_replacement)?;
        state.serialize_field("sensitive", &self.sensitive)?;
        state.end()
    }
}

/// Diff of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDiff {
    /// Operation the diff calls for; `None` when nothing changed.
    pub operation: Option<Operation>,
    /// Changed attributes, sorted by name.
    pub changes: Vec<AttributeChange>,
}

impl<'a> DiffEngine<'a> {
    /// Creates a diff engine over a schema.
    #[must_use]
    pub const fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Diffs a present resource.
    ///
    /// `desired` holds the evaluated attributes of `resource`; secret values
    /// must already be fingerprinted. With no prior state, every attribute
    /// is a change and the operation is a create.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::IncompatibleAttribute`] when a prior and desired
    /// value have different JSON kinds.
    pub fn diff(
        &self,
        resource: &Resource,
        desired: &BTreeMap<String, Evaluated>,
        prior: Option<&ResourceState>,
    ) -> Result<ResourceDiff, PlanError> {
        let Some(prior) = prior else {
            let changes = desired
                .iter()
                .map(|(name, value)| AttributeChange {
                    name: name.clone(),
                    before: None,
                    after: value.clone().into(),
                    forces_replacement: false,
                    sensitive: is_sensitive(resource, name),
                })
                .collect();
            return Ok(ResourceDiff {
                operation: Some(Operation::Create),
                changes,
            });
        };

        let mut changes = Vec::new();

        for (name, value) in desired {
            let before = prior.attributes.get(name);
            let changed = match (value, before) {
                (Evaluated::Known(after), Some(before)) => {
                    check_kinds(resource, name, before, after)?;
                    after != before
                }
                (Evaluated::Known(_), None) | (Evaluated::Deferred(_), _) => true,
            };

            if changed {
                changes.push(AttributeChange {
                    name: name.clone(),
                    before: before.cloned(),
                    after: value.clone().into(),
                    forces_replacement: self.schema.is_immutable(resource, name),
                    sensitive: is_sensitive(resource, name) || prior.sensitive.contains(name),
                });
            }
        }

        for (name, before) in &prior.attributes {
            if !desired.contains_key(name) {
                changes.push(AttributeChange {
                    name: name.clone(),
                    before: Some(before.clone()),
                    after: DiffValue::Removed,
                    forces_replacement: self.schema.is_immutable(resource, name),
                    sensitive: prior.sensitive.contains(name),
                });
            }
        }

        changes.sort_by(|a, b| a.name.cmp(&b.name));

        let operation = if changes.is_empty() {
            None
        } else if changes.iter().any(|c| c.forces_replacement) {
            Some(Operation::Replace)
        } else {
            Some(Operation::Update)
        };

        debug!(
            "Diffed {}: {} changed attributes, operation {:?}",
            resource.id,
            changes.len(),
            operation
        );

        Ok(ResourceDiff { operation, changes })
    }
}

impl From<Evaluated> for DiffValue {
    fn from(value: Evaluated) -> Self {
        match value {
            Evaluated::Known(v) => Self::Known(v),
            Evaluated::Deferred(r) => Self::Unknown(r),
        }
    }
}

impl ResourceDiff {
    /// Names of the attributes forcing replacement.
    #[must_use]
    pub fn replacement_causes(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.forces_replacement)
            .map(|c| c.name.as_str())
            .collect()
    }
}

fn is_sensitive(resource: &Resource, name: &str) -> bool {
    resource.attributes.get(name).is_some_and(crate::graph::Expr::is_sensitive)
}

/// Returns the JSON kind of a value, with integers and floats both `number`.
#[must_use]
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn check_kinds(resource: &Resource, name: &str, before: &Value, after: &Value) -> Result<(), PlanError> {
    let (prior_kind, desired_kind) = (value_kind(before), value_kind(after));
    if prior_kind == "null" || desired_kind == "null" || prior_kind == desired_kind {
        return Ok(());
    }
    Err(PlanError::IncompatibleAttribute {
        id: resource.id.clone(),
        attribute: name.to_string(),
        prior_kind,
        desired_kind,
    })
}
