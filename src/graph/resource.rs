//! Resource declarations and deferred values.
//!
//! A [`Resource`] is a typed, named node whose attributes are [`Expr`]s.
//! Literal values are known at declaration time; [`Reference`]s point at
//! another resource's output and stay deferred until that resource has been
//! applied; [`SecretRef`]s name externally injected secret material.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, GraphError};

/// Concrete attribute map, as recorded in state or returned by a provider.
pub type AttributeMap = BTreeMap<String, Value>;

/// Identifier of a resource: its type tag plus its logical name.
///
/// Rendered as `<type>.<name>`. Types may contain dots
/// (`aws.ec2.Subnet`); names may not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    /// Resource type tag (e.g. `aws.ec2.Vpc`).
    pub resource_type: String,
    /// Logical name, unique per type.
    pub name: String,
}

/// Desired lifecycle of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// The resource should exist.
    #[default]
    Present,
    /// The resource should be destroyed if it exists.
    Absent,
}

/// A pointer to another resource's not-yet-known output attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Resource whose output is referenced.
    pub resource: ResourceId,
    /// Output attribute name.
    pub output: String,
}

/// Name of a secret supplied by a [`crate::config::SecretSource`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret name.
    pub name: String,
}

/// A declared attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A known scalar value.
    Literal(Value),
    /// A deferred value resolved once the referenced resource is applied.
    Reference(Reference),
    /// Secret material injected at plan and apply time.
    Secret(SecretRef),
    /// A list of expressions.
    List(Vec<Expr>),
    /// A map of expressions.
    Map(BTreeMap<String, Expr>),
}

/// Outcome of evaluating an [`Expr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluated {
    /// Every part of the expression is known.
    Known(Value),
    /// The expression waits on this reference.
    Deferred(Reference),
}

/// A single declared resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Declared attributes.
    pub attributes: BTreeMap<String, Expr>,
    /// Desired lifecycle.
    pub lifecycle: Lifecycle,
    /// Attributes that force replacement for this resource only, on top of
    /// the type schema.
    pub replace_on_change: BTreeSet<String>,
}

impl ResourceId {
    /// Creates a new identifier.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Parses `<type>.<name>`, splitting on the last dot.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is empty.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let (resource_type, name) = s
            .rsplit_once('.')
            .ok_or_else(|| ConfigError::invalid_reference(s, "expected <type>.<name>"))?;

        if resource_type.is_empty() || name.is_empty() {
            return Err(ConfigError::invalid_reference(s, "type and name must not be empty"));
        }

        Ok(Self::new(resource_type, name))
    }

    /// Checks that the identifier survives a round trip through its
    /// `<type>.<name>` form.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidIdentifier`] if the type or name is
    /// empty or the name contains a dot.
    pub fn check(&self) -> Result<(), GraphError> {
        let reason = if self.resource_type.is_empty() {
            "type must not be empty"
        } else if self.name.is_empty() {
            "name must not be empty"
        } else if self.name.contains('.') {
            "name must not contain '.'"
        } else {
            return Ok(());
        };
        Err(GraphError::InvalidIdentifier {
            resource_type: self.resource_type.clone(),
            name: self.name.clone(),
            reason,
        })
    }

    /// Returns a reference to one of this resource's outputs.
    #[must_use]
    pub fn output(&self, output: impl Into<String>) -> Reference {
        Reference {
            resource: self.clone(),
            output: output.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

impl Reference {
    /// Parses a whole-string reference expression `${<type>.<name>.<output>}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is not delimited by `${` and `}`
    /// or does not name a resource and an output.
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let inner = expression
            .strip_prefix("${")
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| ConfigError::invalid_reference(expression, "expected ${<type>.<name>.<output>}"))?;

        let (resource, output) = inner
            .rsplit_once('.')
            .ok_or_else(|| ConfigError::invalid_reference(expression, "missing output attribute"))?;

        if output.is_empty() {
            return Err(ConfigError::invalid_reference(expression, "missing output attribute"));
        }

        let resource = ResourceId::parse(resource)
            .map_err(|_| ConfigError::invalid_reference(expression, "expected <type>.<name> before the output"))?;

        Ok(Self {
            resource,
            output: output.to_string(),
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.resource, self.output)
    }
}

impl Expr {
    /// Creates a literal expression.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates a secret expression.
    #[must_use]
    pub fn secret(name: impl Into<String>) -> Self {
        Self::Secret(SecretRef { name: name.into() })
    }

    /// Converts a raw manifest value into an expression.
    ///
    /// Strings are first interpolated with `${var.NAME}` placeholders from
    /// `vars`. A string that is then exactly `${...}` becomes a
    /// [`Reference`]; any other leftover `${` is rejected. A map with the
    /// single key `secret` becomes a [`SecretRef`].
    ///
    /// # Errors
    ///
    /// Returns an error on unknown variables or malformed references.
    pub fn from_value(value: &Value, vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        match value {
            Value::String(s) => {
                let s = interpolate(s, vars)?;
                if s.starts_with("${") && s.ends_with('}') && s.matches("${").count() == 1 {
                    Reference::parse(&s).map(Self::Reference)
                } else if s.contains("${") {
                    Err(ConfigError::invalid_reference(
                        s,
                        "references must be the whole value; embedding them in text is not supported",
                    ))
                } else {
                    Ok(Self::Literal(Value::String(s)))
                }
            }
            Value::Array(items) => items
                .iter()
                .map(|v| Self::from_value(v, vars))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(name)) = map.get("secret") {
                        return Ok(Self::secret(name.clone()));
                    }
                }
                map.iter()
                    .map(|(k, v)| Self::from_value(v, vars).map(|e| (k.clone(), e)))
                    .collect::<Result<BTreeMap<_, _>, _>>()
                    .map(Self::Map)
            }
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// Collects every reference inside this expression, in traversal order.
    #[must_use]
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Reference(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|e| e.collect_references(out)),
            Self::Map(map) => map.values().for_each(|e| e.collect_references(out)),
            Self::Literal(_) | Self::Secret(_) => {}
        }
    }

    /// Returns true if this expression contains secret material.
    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        match self {
            Self::Secret(_) => true,
            Self::List(items) => items.iter().any(Self::is_sensitive),
            Self::Map(map) => map.values().any(Self::is_sensitive),
            Self::Literal(_) | Self::Reference(_) => false,
        }
    }

    /// Evaluates the expression.
    ///
    /// `lookup` returns the realized value of a reference, or `None` while it
    /// is still unknown. `secret` turns a secret name into the value to embed.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `secret`.
    pub fn evaluate<L, S, E>(&self, lookup: &L, secret: &S) -> Result<Evaluated, E>
    where
        L: Fn(&Reference) -> Option<Value>,
        S: Fn(&SecretRef) -> Result<Value, E>,
    {
        match self {
            Self::Literal(v) => Ok(Evaluated::Known(v.clone())),
            Self::Reference(r) => Ok(lookup(r).map_or_else(|| Evaluated::Deferred(r.clone()), Evaluated::Known)),
            Self::Secret(s) => secret(s).map(Evaluated::Known),
            Self::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item.evaluate(lookup, secret)? {
                        Evaluated::Known(v) => values.push(v),
                        deferred @ Evaluated::Deferred(_) => return Ok(deferred),
                    }
                }
                Ok(Evaluated::Known(Value::Array(values)))
            }
            Self::Map(map) => {
                let mut values = serde_json::Map::new();
                for (key, item) in map {
                    match item.evaluate(lookup, secret)? {
                        Evaluated::Known(v) => {
                            values.insert(key.clone(), v);
                        }
                        deferred @ Evaluated::Deferred(_) => return Ok(deferred),
                    }
                }
                Ok(Evaluated::Known(Value::Object(values)))
            }
        }
    }
}

impl From<Reference> for Expr {
    fn from(reference: Reference) -> Self {
        Self::Reference(reference)
    }
}

impl Resource {
    /// Creates a present resource with no attributes.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: BTreeMap::new(),
            lifecycle: Lifecycle::Present,
            replace_on_change: BTreeSet::new(),
        }
    }

    /// Sets an attribute expression.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, expr: impl Into<Expr>) -> Self {
        self.attributes.insert(name.into(), expr.into());
        self
    }

    /// Sets a literal attribute.
    #[must_use]
    pub fn with_literal(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_attribute(name, Expr::literal(value))
    }

    /// Marks the resource for destruction.
    #[must_use]
    pub fn absent(mut self) -> Self {
        self.lifecycle = Lifecycle::Absent;
        self
    }

    /// Adds a resource-specific replace-on-change attribute.
    #[must_use]
    pub fn replace_on_change(mut self, attribute: impl Into<String>) -> Self {
        self.replace_on_change.insert(attribute.into());
        self
    }

    /// Returns every reference held by the attributes.
    #[must_use]
    pub fn references(&self) -> Vec<&Reference> {
        self.attributes.values().flat_map(Expr::references).collect()
    }

    /// Returns true if the resource should exist.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.lifecycle == Lifecycle::Present
    }
}

/// Replaces `${var.NAME}` placeholders; other `${...}` text is left as is.
fn interpolate(s: &str, vars: &BTreeMap<String, String>) -> Result<String, ConfigError> {
    const PREFIX: &str = "${var.";

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find(PREFIX) {
        out.push_str(&rest[..start]);
        let after = &rest[start + PREFIX.len()..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::invalid_reference(s, "unterminated ${var. placeholder"));
        };
        let name = &after[..end];
        let value = vars.get(name).ok_or_else(|| ConfigError::UnknownVariable {
            name: name.to_string(),
            expression: s.to_string(),
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
