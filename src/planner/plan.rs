//! Execution plan types.
//!
//! A [`Plan`] is an ordered list of entries; executing them front to back
//! respects every dependency. Each entry also names the earlier entries it
//! waits on, so a scheduler can run independent entries concurrently.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::Fingerprinter;
use crate::error::PlanError;
use crate::graph::{Resource, ResourceId};

use super::diff::{AttributeChange, DiffValue};

/// Operation a plan entry performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create a new resource.
    Create,
    /// Change attributes in place.
    Update,
    /// Destroy and recreate.
    Replace,
    /// Destroy.
    Delete,
}

/// A single planned operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    /// Target resource.
    pub resource_id: ResourceId,
    /// Operation to perform.
    pub operation: Operation,
    /// Attribute differences driving the operation.
    pub changes: Vec<AttributeChange>,
    /// Indices of earlier entries that must complete first.
    pub depends_on: Vec<usize>,
    /// Human-readable reason.
    pub reason: String,
    /// Declaration to apply; `None` for deletes of undeclared resources.
    #[serde(skip)]
    pub(crate) resource: Option<Resource>,
    /// Resources this one depends on in the declared graph.
    #[serde(skip)]
    pub(crate) dependencies: BTreeSet<ResourceId>,
}

/// Per-operation entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    /// Number of creates.
    pub create: usize,
    /// Number of in-place updates.
    pub update: usize,
    /// Number of replacements.
    pub replace: usize,
    /// Number of deletes.
    pub delete: usize,
}

/// An ordered, dependency-respecting list of operations.
///
/// Contains no timestamps or other ambient data: planning the same input
/// twice yields byte-identical JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    /// Entries in execution order.
    pub entries: Vec<PlanEntry>,
    /// Stack outputs by name, known now or after apply.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, DiffValue>,
}

impl Operation {
    /// Returns the symbol used in plan listings.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
        }
    }

    /// Returns true if the operation destroys the existing resource.
    #[must_use]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::Replace | Self::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        };
        write!(f, "{op}")
    }
}

impl PlanEntry {
    /// Creates an entry with no attached declaration.
    #[must_use]
    pub fn new(resource_id: ResourceId, operation: Operation, reason: impl Into<String>) -> Self {
        Self {
            resource_id,
            operation,
            changes: Vec::new(),
            depends_on: Vec::new(),
            reason: reason.into(),
            resource: None,
            dependencies: BTreeSet::new(),
        }
    }
}

impl Plan {
    /// Returns true if nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Finds the entry for a resource.
    #[must_use]
    pub fn entry(&self, id: &ResourceId) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| &e.resource_id == id)
    }

    /// Returns the operation planned for a resource, if any.
    #[must_use]
    pub fn operation_for(&self, id: &ResourceId) -> Option<Operation> {
        self.entry(id).map(|e| e.operation)
    }

    /// Counts entries per operation.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for entry in &self.entries {
            match entry.operation {
                Operation::Create => summary.create += 1,
                Operation::Update => summary.update += 1,
                Operation::Replace => summary.replace += 1,
                Operation::Delete => summary.delete += 1,
            }
        }
        summary
    }

    /// Returns true if any entry destroys a resource.
    #[must_use]
    pub fn has_destructive_changes(&self) -> bool {
        self.entries.iter().any(|e| e.operation.is_destructive())
    }

    /// Partitions entry indices into waves.
    ///
    /// An entry's wave is one more than the deepest wave among its
    /// `depends_on`; entries of one wave never wait on each other. Indices
    /// that do not point at an earlier entry are ignored.
    #[must_use]
    pub fn waves(&self) -> Vec<Vec<usize>> {
        let mut depth = vec![0usize; self.entries.len()];
        let mut waves: Vec<Vec<usize>> = Vec::new();

        for (idx, entry) in self.entries.iter().enumerate() {
            let d = entry
                .depends_on
                .iter()
                .filter(|&&dep| dep < idx)
                .map(|&dep| depth[dep] + 1)
                .max()
                .unwrap_or(0);
            depth[idx] = d;
            if waves.len() <= d {
                waves.resize_with(d + 1, Vec::new);
            }
            waves[d].push(idx);
        }

        waves
    }

    /// Serializes the plan to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Returns the SHA-256 fingerprint of the plan's JSON form.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        Fingerprinter::new().hash_bytes(&bytes)
    }

    /// Checks that the plan still matches an approved fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::StalePlan`] on mismatch.
    pub fn verify_fingerprint(&self, expected: &str) -> Result<(), PlanError> {
        let found = self.fingerprint();
        if Fingerprinter::hashes_match(expected, &found) {
            Ok(())
        } else {
            Err(PlanError::StalePlan {
                expected: expected.to_string(),
                found,
            })
        }
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "{:>3} {} ({})",
                entry.operation.symbol(),
                entry.resource_id,
                entry.reason
            )?;
        }
        write!(f, "Plan: {}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, operation: Operation, depends_on: Vec<usize>) -> PlanEntry {
        let mut e = PlanEntry::new(ResourceId::new("t", name), operation, "test");
        e.depends_on = depends_on;
        e
    }

    fn sample() -> Plan {
        Plan {
            entries: vec![
                entry("vpc", Operation::Create, vec![]),
                entry("a", Operation::Create, vec![0]),
                entry("b", Operation::Update, vec![0]),
                entry("lb", Operation::Replace, vec![1, 2]),
                entry("old", Operation::Delete, vec![]),
            ],
            ..Plan::default()
        }
    }

    #[test]
    fn test_waves() {
        assert_eq!(sample().waves(), vec![vec![0, 4], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_waves_ignore_forward_and_out_of_range_indices() {
        let plan = Plan {
            entries: vec![
                entry("a", Operation::Create, vec![1]),
                entry("b", Operation::Create, vec![0, 7]),
                entry("c", Operation::Create, vec![2]),
            ],
            ..Plan::default()
        };
        assert_eq!(plan.waves(), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_outputs_are_serialized_only_when_present() {
        assert!(!sample().to_json().unwrap().contains("outputs"));

        let mut plan = sample();
        plan.outputs
            .insert(String::from("vpc_id"), DiffValue::Known(serde_json::json!("vpc-1")));
        let json = plan.to_json().unwrap();
        assert!(json.contains("\"vpc_id\""));
        assert_ne!(plan.fingerprint(), sample().fingerprint());
    }

    #[test]
    fn test_summary() {
        let summary = sample().summary();
        assert_eq!(
            summary,
            PlanSummary {
                create: 2,
                update: 1,
                replace: 1,
                delete: 1,
            }
        );
        assert_eq!(summary.to_string(), "2 to create, 1 to update, 1 to replace, 1 to delete");
        assert!(sample().has_destructive_changes());
    }

    #[test]
    fn test_fingerprint_verification() {
        let plan = sample();
        let fp = plan.fingerprint();
        assert!(plan.verify_fingerprint(&fp).is_ok());

        let mut changed = sample();
        changed.entries.pop();
        assert!(matches!(
            changed.verify_fingerprint(&fp),
            Err(PlanError::StalePlan { .. })
        ));
    }

    #[test]
    fn test_json_omits_internal_fields() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"operation\": \"replace\""));
        assert!(json.contains("\"resource_id\": \"t.vpc\""));
        assert!(!json.contains("dependencies"));
    }

    #[test]
    fn test_display() {
        let text = sample().to_string();
        assert!(text.contains("-/+ t.lb (test)"));
        assert!(text.ends_with("Plan: 2 to create, 1 to update, 1 to replace, 1 to delete"));
    }
}
