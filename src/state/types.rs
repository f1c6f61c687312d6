//! State types for tracking applied resources.
//!
//! A [`StateSnapshot`] is the planner's view of what was last applied:
//! attribute values, the outputs the provider returned, and the dependency
//! edges in force at the time. Reading and writing snapshots is left to the
//! embedding application; this module only (de)serializes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::StateError;
use crate::graph::{AttributeMap, ResourceId};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// The last-known state of every managed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// State format version.
    pub version: String,
    /// Incremented on every recorded change.
    #[serde(default)]
    pub serial: u64,
    /// Applied resources, keyed by identifier.
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, ResourceState>,
}

/// Recorded state of a single resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Last applied attribute values. Sensitive attributes hold fingerprints.
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Outputs returned by the provider (e.g. `id`, `arn`).
    #[serde(default)]
    pub outputs: AttributeMap,
    /// Resources this one depended on when it was applied.
    #[serde(default)]
    pub dependencies: BTreeSet<ResourceId>,
    /// Names of attributes stored as secret fingerprints.
    #[serde(default)]
    pub sensitive: BTreeSet<String>,
    /// When the resource was last applied.
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

impl StateSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            serial: 0,
            resources: BTreeMap::new(),
        }
    }

    /// Parses a snapshot from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or was written by an
    /// incompatible major version.
    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let snapshot: Self = serde_json::from_str(json).map_err(|e| StateError::Corrupted {
            message: e.to_string(),
        })?;

        let major = |v: &str| v.split('.').next().unwrap_or_default().to_string();
        if major(&snapshot.version) != major(STATE_VERSION) {
            return Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: snapshot.version,
            });
        }

        debug!(
            "Loaded state snapshot serial {} with {} resources",
            snapshot.serial,
            snapshot.resources.len()
        );
        Ok(snapshot)
    }

    /// Serializes the snapshot to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, StateError> {
        serde_json::to_string_pretty(self).map_err(|e| StateError::serialization(e.to_string()))
    }

    /// Gets a resource by identifier.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources.get(id)
    }

    /// Returns true if the resource is recorded.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Returns the number of recorded resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Inserts a resource without bumping the serial. Use this to seed a
    /// snapshot; use [`Self::record`] for changes made by an apply.
    #[must_use]
    pub fn with_resource(mut self, id: ResourceId, state: ResourceState) -> Self {
        self.resources.insert(id, state);
        self
    }

    /// Records an applied resource.
    pub fn record(&mut self, id: ResourceId, state: ResourceState) {
        self.resources.insert(id, state);
        self.serial += 1;
    }

    /// Removes a destroyed resource.
    pub fn remove(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let removed = self.resources.remove(id);
        if removed.is_some() {
            self.serial += 1;
        }
        removed
    }

    /// Looks up a recorded output value.
    #[must_use]
    pub fn output(&self, id: &ResourceId, output: &str) -> Option<&serde_json::Value> {
        self.resources.get(id).and_then(|r| r.outputs.get(output))
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceState {
    /// Creates a state holding the given attributes.
    #[must_use]
    pub fn new(attributes: AttributeMap) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets an output.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    /// Adds a recorded dependency.
    #[must_use]
    pub fn with_dependency(mut self, id: ResourceId) -> Self {
        self.dependencies.insert(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vpc() -> ResourceId {
        ResourceId::new("aws.ec2.Vpc", "main")
    }

    #[test]
    fn test_snapshot_json_roundtrip_keeps_identifiers_as_keys() {
        let snapshot = StateSnapshot::new().with_resource(
            vpc(),
            ResourceState::new(AttributeMap::new())
                .with_attribute("cidr_block", "10.0.0.0/16")
                .with_output("id", "vpc-123"),
        );

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"aws.ec2.Vpc.main\""));

        let loaded = StateSnapshot::from_json(&json).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.output(&vpc(), "id"), Some(&json!("vpc-123")));
    }

    #[test]
    fn test_version_mismatch() {
        let err = StateSnapshot::from_json(r#"{"version": "2.0", "resources": {}}"#).unwrap_err();
        assert!(matches!(err, StateError::VersionMismatch { .. }));

        assert!(StateSnapshot::from_json(r#"{"version": "1.3"}"#).is_ok());
    }

    #[test]
    fn test_corrupted_state() {
        let err = StateSnapshot::from_json("{not json").unwrap_err();
        assert!(matches!(err, StateError::Corrupted { .. }));

        let bad_key = r#"{"version": "1.0", "resources": {"novpc": {}}}"#;
        assert!(matches!(
            StateSnapshot::from_json(bad_key).unwrap_err(),
            StateError::Corrupted { .. }
        ));
    }

    #[test]
    fn test_record_and_remove_bump_serial() {
        let mut snapshot = StateSnapshot::new();
        snapshot.record(vpc(), ResourceState::default());
        assert_eq!(snapshot.serial, 1);
        assert!(snapshot.contains(&vpc()));

        assert!(snapshot.remove(&vpc()).is_some());
        assert!(snapshot.remove(&vpc()).is_none());
        assert_eq!(snapshot.serial, 2);
        assert!(snapshot.is_empty());
    }
}
