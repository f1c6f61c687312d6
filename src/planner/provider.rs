//! Provider seam.
//!
//! A [`Provider`] turns one plan entry into API calls against a real cloud.
//! No provider ships with this crate; the embedding application supplies one.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ProviderError;
use crate::graph::{AttributeMap, ResourceId};
use crate::state::ResourceState;

use super::plan::Operation;

/// Applies single operations against real infrastructure.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Performs `request` and returns the resource's outputs (e.g. `id`,
    /// `arn`). Outputs of a delete are ignored.
    async fn apply(&self, request: &OperationRequest) -> Result<AttributeMap, ProviderError>;
}

/// A fully resolved operation, ready for a provider.
#[derive(Clone, PartialEq)]
pub struct OperationRequest {
    /// Target resource.
    pub resource_id: ResourceId,
    /// Operation to perform.
    pub operation: Operation,
    /// Concrete attribute values. Secrets are in clear text here and only here.
    pub attributes: AttributeMap,
    /// Names of attributes carrying secret material.
    pub sensitive: BTreeSet<String>,
    /// Last recorded state, absent for creates.
    pub prior: Option<ResourceState>,
}

impl OperationRequest {
    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

// Sensitive values are never printed.
impl fmt::Debug for OperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attributes: AttributeMap = self
            .attributes
            .iter()
            .map(|(k, v)| {
                let shown = if self.sensitive.contains(k) {
                    Value::String(String::from("(sensitive)"))
                } else {
                    v.clone()
                };
                (k.clone(), shown)
            })
            .collect();

        f.debug_struct("OperationRequest")
            .field("resource_id", &self.resource_id)
            .field("operation", &self.operation)
            .field("attributes", &attributes)
            .field("sensitive", &self.sensitive)
            .field("prior", &self.prior.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_debug_redacts_secrets() {
        let mut attributes = AttributeMap::new();
        attributes.insert(String::from("password"), json!("hunter2"));
        attributes.insert(String::from("engine"), json!("mysql"));

        let request = OperationRequest {
            resource_id: ResourceId::new("aws.rds.Instance", "db"),
            operation: Operation::Create,
            attributes,
            sensitive: BTreeSet::from([String::from("password")]),
            prior: None,
        };

        let debug = format!("{request:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("mysql"));
        assert_eq!(request.attribute("password"), Some(&json!("hunter2")));
    }
}
