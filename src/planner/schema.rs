//! Replacement schema.
//!
//! Some attributes cannot be changed in place: moving a subnet to another
//! availability zone means destroying it and creating a new one. The schema
//! records, per resource type, which attributes force replacement.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::TypeSchemaConfig;
use crate::graph::Resource;

/// Immutable attribute names per resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    immutable: BTreeMap<String, BTreeSet<String>>,
}

/// Immutable attributes of the AWS types used by the stock topologies.
const AWS_IMMUTABLE: &[(&str, &[&str])] = &[
    ("aws.ec2.Vpc", &["cidr_block", "instance_tenancy"]),
    ("aws.ec2.Subnet", &["availability_zone", "cidr_block", "vpc_id"]),
    ("aws.ec2.SecurityGroup", &["name", "vpc_id", "description"]),
    ("aws.ec2.RouteTable", &["vpc_id"]),
    ("aws.ec2.RouteTableAssociation", &["route_table_id", "subnet_id"]),
    ("aws.ec2.InternetGateway", &[]),
    ("aws.ec2.Instance", &["ami", "subnet_id", "availability_zone", "key_name"]),
    ("aws.lb.LoadBalancer", &["internal", "load_balancer_type", "name"]),
    ("aws.lb.TargetGroup", &["port", "protocol", "vpc_id", "target_type", "name"]),
    ("aws.lb.Listener", &["load_balancer_arn"]),
    ("aws.iam.Role", &["name"]),
    ("aws.iam.RolePolicyAttachment", &["role", "policy_arn"]),
    ("aws.eks.Cluster", &["name", "role_arn"]),
    ("aws.eks.FargateProfile", &["cluster_name", "fargate_profile_name", "pod_execution_role_arn", "subnet_ids", "selectors"]),
    ("aws.ecs.Cluster", &["name"]),
    ("aws.ecs.TaskDefinition", &["family", "container_definitions", "cpu", "memory", "network_mode", "requires_compatibilities", "execution_role_arn"]),
    ("aws.ecs.Service", &["name", "cluster", "launch_type"]),
    ("aws.rds.Instance", &["engine", "identifier", "db_subnet_group_name", "storage_encrypted"]),
    ("aws.rds.SubnetGroup", &["name"]),
];

impl Schema {
    /// Creates an empty schema; nothing forces replacement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the schema for the AWS resource types of the stock topologies.
    #[must_use]
    pub fn aws_defaults() -> Self {
        let mut schema = Self::new();
        for (resource_type, attrs) in AWS_IMMUTABLE {
            schema.immutable.insert(
                (*resource_type).to_string(),
                attrs.iter().map(|a| (*a).to_string()).collect(),
            );
        }
        schema
    }

    /// Marks attributes of a type as immutable.
    #[must_use]
    pub fn with_immutable<I, S>(mut self, resource_type: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.immutable
            .entry(resource_type.into())
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Adds the `schema:` section of a manifest.
    #[must_use]
    pub fn merge_config(mut self, config: &BTreeMap<String, TypeSchemaConfig>) -> Self {
        for (resource_type, type_schema) in config {
            self = self.with_immutable(resource_type.clone(), type_schema.immutable.iter().cloned());
        }
        self
    }

    /// Returns true if changing `attribute` on `resource` forces replacement.
    #[must_use]
    pub fn is_immutable(&self, resource: &Resource, attribute: &str) -> bool {
        resource.replace_on_change.contains(attribute)
            || self
                .immutable
                .get(&resource.id.resource_type)
                .is_some_and(|attrs| attrs.contains(attribute))
    }

    /// Returns the immutable attributes registered for a type.
    #[must_use]
    pub fn immutable_for(&self, resource_type: &str) -> Option<&BTreeSet<String>> {
        self.immutable.get(resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aws_defaults_cover_subnet_zone_and_cidr() {
        let schema = Schema::aws_defaults();
        let subnet = Resource::new("aws.ec2.Subnet", "one");

        assert!(schema.is_immutable(&subnet, "cidr_block"));
        assert!(schema.is_immutable(&subnet, "availability_zone"));
        assert!(!schema.is_immutable(&subnet, "tags"));
        assert!(schema.immutable_for("aws.ecs.TaskDefinition").is_some());
    }

    #[test]
    fn test_resource_level_override() {
        let schema = Schema::new();
        let bucket = Resource::new("custom.Bucket", "b").replace_on_change("region");

        assert!(schema.is_immutable(&bucket, "region"));
        assert!(!schema.is_immutable(&Resource::new("custom.Bucket", "c"), "region"));
    }

    #[test]
    fn test_merge_config_extends_types() {
        let mut config = BTreeMap::new();
        config.insert(
            String::from("aws.ec2.Vpc"),
            TypeSchemaConfig {
                immutable: BTreeSet::from([String::from("ipv6_cidr_block")]),
            },
        );

        let schema = Schema::aws_defaults().merge_config(&config);
        let vpc = Resource::new("aws.ec2.Vpc", "main");
        assert!(schema.is_immutable(&vpc, "ipv6_cidr_block"));
        assert!(schema.is_immutable(&vpc, "cidr_block"));
    }
}
