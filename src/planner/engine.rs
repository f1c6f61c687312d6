//! Convergence planner.
//!
//! [`Planner`] owns the declared [`ResourceGraph`] and turns it, together
//! with a prior [`StateSnapshot`], into a [`Plan`]. Planning is pure: it
//! performs no I/O and returns either a complete plan or an error.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{EnvSecretSource, Fingerprinter, Manifest, SecretSource};
use crate::error::{ExecutionError, GraphError, PlanError, Result};
use crate::graph::{sort_by_index, Evaluated, Reference, Resource, ResourceGraph, ResourceId, SecretRef};
use crate::state::StateSnapshot;

use super::diff::{DiffEngine, DiffValue};
use super::plan::{Operation, Plan, PlanEntry};
use super::schema::Schema;

/// Builds convergence plans from declarations and prior state.
#[derive(Debug, Clone)]
pub struct Planner {
    graph: ResourceGraph,
    schema: Schema,
    secrets: Arc<dyn SecretSource>,
    outputs: BTreeMap<String, Reference>,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    /// Creates a planner with the AWS default schema and environment secrets.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: ResourceGraph::new(),
            schema: Schema::aws_defaults(),
            secrets: Arc::new(EnvSecretSource::new()),
            outputs: BTreeMap::new(),
        }
    }

    /// Creates a planner from a manifest, registering declarations in order,
    /// linking explicit `depends_on` entries and exporting `outputs`.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed declarations or outputs, duplicates or
    /// unknown `depends_on` targets.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        let mut planner = Self::new().with_schema(Schema::aws_defaults().merge_config(&manifest.schema));

        for resource in manifest.expand()? {
            planner.register(resource)?;
        }
        for decl in &manifest.resources {
            let from = decl.id();
            for to in decl.dependencies()? {
                planner.link(&from, &to)?;
            }
        }
        for (name, reference) in manifest.exports()? {
            planner.export(name, reference);
        }

        info!(
            "Loaded {} resources for project {}",
            planner.graph.len(),
            manifest.project.name
        );
        Ok(planner)
    }

    /// Replaces the replacement schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Replaces the secret source.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Adds a declaration.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidIdentifier`] for an empty or dotted name
    /// and [`GraphError::DuplicateResource`] if the identifier is taken.
    pub fn register(&mut self, resource: Resource) -> std::result::Result<usize, GraphError> {
        self.graph.register(resource)
    }

    /// Declares a stack output exposing a resource output under `name`.
    ///
    /// The target is checked when planning.
    pub fn export(&mut self, name: impl Into<String>, reference: Reference) {
        self.outputs.insert(name.into(), reference);
    }

    /// Records that `from` depends on `to`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] if either end is not registered.
    pub fn link(&mut self, from: &ResourceId, to: &ResourceId) -> std::result::Result<(), GraphError> {
        self.graph.link(from, to)
    }

    /// Returns the declared graph.
    #[must_use]
    pub const fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Returns the secret source.
    #[must_use]
    pub fn secrets(&self) -> Arc<dyn SecretSource> {
        Arc::clone(&self.secrets)
    }

    /// Computes the plan converging `prior` to the declared graph.
    ///
    /// Present resources are classified in topological order (see
    /// [`ResourceGraph::topological_order`] for the tie-break rule) and
    /// emitted in that order. Deletes follow, dependents first.
    ///
    /// # Errors
    ///
    /// Returns a graph error for cycles or dangling references and a plan
    /// error for dependencies on absent resources, incompatible attribute
    /// kinds, missing secrets or outputs of absent resources. No partial
    /// plan is returned.
    pub fn plan(&self, prior: &StateSnapshot) -> Result<Plan> {
        let (order, edges) = self.graph.sorted_indices()?;
        self.check_absent_dependencies(&order, &edges)?;

        let engine = DiffEngine::new(&self.schema);
        let fingerprinter = Fingerprinter::new();
        let key = self.secrets.fingerprint_key();
        let nodes: Vec<&Resource> = self.graph.resources().collect();

        // Resources whose outputs are unknown until apply.
        let mut pending: HashSet<ResourceId> = HashSet::new();
        let mut entries: Vec<PlanEntry> = Vec::new();
        // Entry index per declared node, for present resources with an entry.
        let mut entry_of: Vec<Option<usize>> = vec![None; nodes.len()];
        // Nearest entries each node waits on, skipping through no-ops.
        let mut reach: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];

        for &idx in &order {
            let resource = nodes[idx];
            if !resource.is_present() {
                continue;
            }

            let lookup = |r: &Reference| -> Option<Value> {
                if pending.contains(&r.resource) {
                    None
                } else {
                    prior.output(&r.resource, &r.output).cloned()
                }
            };
            let secret = |s: &SecretRef| -> std::result::Result<Value, PlanError> {
                self.secrets
                    .resolve(&s.name)
                    .map(|v| Value::String(fingerprinter.fingerprint_secret_keyed(key.as_deref(), &v)))
                    .ok_or_else(|| PlanError::MissingSecret {
                        id: resource.id.clone(),
                        name: s.name.clone(),
                    })
            };

            let mut desired: BTreeMap<String, Evaluated> = BTreeMap::new();
            for (name, expr) in &resource.attributes {
                desired.insert(name.clone(), expr.evaluate(&lookup, &secret)?);
            }

            let diff = engine.diff(resource, &desired, prior.get(&resource.id))?;

            let waits: BTreeSet<usize> = edges[idx]
                .iter()
                .flat_map(|&dep| match entry_of[dep] {
                    Some(e) => BTreeSet::from([e]),
                    None => reach[dep].clone(),
                })
                .collect();

            let Some(operation) = diff.operation else {
                reach[idx] = waits;
                continue;
            };

            if matches!(operation, Operation::Create | Operation::Replace) {
                pending.insert(resource.id.clone());
            }

            let reason = match operation {
                Operation::Create => String::from("not in prior state"),
                Operation::Replace => format!("{} forces replacement", diff.replacement_causes().join(", ")),
                _ => format!("{} attribute(s) changed", diff.changes.len()),
            };

            debug!("Planned {operation} for {}", resource.id);
            entry_of[idx] = Some(entries.len());
            entries.push(PlanEntry {
                resource_id: resource.id.clone(),
                operation,
                changes: diff.changes,
                depends_on: waits.into_iter().collect(),
                reason,
                resource: Some(resource.clone()),
                dependencies: edges[idx].iter().map(|&d| nodes[d].id.clone()).collect(),
            });
        }

        self.append_deletes(&mut entries, &edges, prior)?;
        let outputs = self.plan_outputs(&pending, prior)?;

        let plan = Plan { entries, outputs };
        info!("Plan: {}", plan.summary());
        Ok(plan)
    }

    /// Reads the stack outputs from state, typically right after execution.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::UnresolvedReference`] for the first output
    /// whose value is not recorded in `state`.
    pub fn resolve_outputs(&self, state: &StateSnapshot) -> std::result::Result<BTreeMap<String, Value>, ExecutionError> {
        self.outputs
            .iter()
            .map(|(name, reference)| {
                state
                    .output(&reference.resource, &reference.output)
                    .map(|value| (name.clone(), value.clone()))
                    .ok_or_else(|| ExecutionError::UnresolvedReference {
                        id: reference.resource.clone(),
                        reference: reference.to_string(),
                    })
            })
            .collect()
    }

    /// Values of the stack outputs as far as they are known before apply.
    fn plan_outputs(
        &self,
        pending: &HashSet<ResourceId>,
        prior: &StateSnapshot,
    ) -> Result<BTreeMap<String, DiffValue>> {
        let mut outputs = BTreeMap::new();
        for (name, reference) in &self.outputs {
            let target = self
                .graph
                .get(&reference.resource)
                .ok_or_else(|| GraphError::UnknownResource {
                    id: reference.resource.clone(),
                    referenced_by: None,
                })?;
            if !target.is_present() {
                return Err(PlanError::OutputOfAbsent {
                    output: name.clone(),
                    id: target.id.clone(),
                }
                .into());
            }

            let known = if pending.contains(&target.id) {
                None
            } else {
                prior.output(&reference.resource, &reference.output).cloned()
            };
            outputs.insert(
                name.clone(),
                known.map_or_else(|| DiffValue::Unknown(reference.clone()), DiffValue::Known),
            );
        }
        Ok(outputs)
    }

    /// Fails if a present resource depends on one declared absent.
    fn check_absent_dependencies(&self, order: &[usize], edges: &[BTreeSet<usize>]) -> std::result::Result<(), PlanError> {
        let nodes: Vec<&Resource> = self.graph.resources().collect();
        for &idx in order {
            if !nodes[idx].is_present() {
                continue;
            }
            if let Some(&dep) = edges[idx].iter().find(|&&d| !nodes[d].is_present()) {
                return Err(PlanError::DependsOnAbsent {
                    id: nodes[idx].id.clone(),
                    dependency: nodes[dep].id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Appends deletes for declared-absent resources still in state and for
    /// orphans, dependents before their dependencies.
    fn append_deletes(
        &self,
        entries: &mut Vec<PlanEntry>,
        edges: &[BTreeSet<usize>],
        prior: &StateSnapshot,
    ) -> std::result::Result<(), GraphError> {
        // Priority order: declared-absent by declaration, then orphans by id.
        let mut doomed: Vec<(ResourceId, &'static str)> = self
            .graph
            .resources()
            .filter(|r| !r.is_present() && prior.contains(&r.id))
            .map(|r| (r.id.clone(), "declared absent"))
            .collect();
        doomed.extend(
            prior
                .resources
                .keys()
                .filter(|id| !self.graph.contains(id))
                .map(|id| (id.clone(), "no longer declared")),
        );

        if doomed.is_empty() {
            return Ok(());
        }

        let local: BTreeMap<&ResourceId, usize> = doomed.iter().enumerate().map(|(i, (id, _))| (id, i)).collect();

        // What each doomed resource depends on: recorded edges plus declared ones.
        let depends: Vec<BTreeSet<ResourceId>> = doomed
            .iter()
            .map(|(id, _)| {
                let mut deps = prior.get(id).map(|s| s.dependencies.clone()).unwrap_or_default();
                if let Some(pos) = self.graph.position(id) {
                    deps.extend(edges[pos].iter().filter_map(|&d| self.graph.at(d).map(|r| r.id.clone())));
                }
                deps
            })
            .collect();

        // Reverse order: a dependency is deleted after every doomed dependent.
        let mut before: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); doomed.len()];
        for (dependent, deps) in depends.iter().enumerate() {
            for dep in deps {
                if let Some(&d) = local.get(dep) {
                    before[d].insert(dependent);
                }
            }
        }

        let order = sort_by_index(&before).map_err(|path| GraphError::CyclicDependency {
            cycle: path.into_iter().map(|i| doomed[i].0.clone()).collect(),
        })?;

        let live = entries.len();
        let mut delete_entry: Vec<usize> = vec![0; doomed.len()];

        for i in order {
            let (id, reason) = &doomed[i];

            let mut waits: BTreeSet<usize> = before[i].iter().map(|&j| delete_entry[j]).collect();
            waits.extend(
                entries[..live]
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| prior.get(&e.resource_id).is_some_and(|s| s.dependencies.contains(id)))
                    .map(|(k, _)| k),
            );

            debug!("Planned delete for {id} ({reason})");
            delete_entry[i] = entries.len();
            let mut entry = PlanEntry::new(id.clone(), Operation::Delete, *reason);
            entry.depends_on = waits.into_iter().collect();
            entry.resource = self.graph.get(id).cloned();
            entry.dependencies = depends[i].clone();
            entries.push(entry);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManifestParser, StaticSecretSource};
    use crate::error::InfraError;
    use crate::graph::{AttributeMap, Expr};
    use crate::state::ResourceState;
    use serde_json::json;

    fn id(t: &str, n: &str) -> ResourceId {
        ResourceId::new(t, n)
    }

    fn vpc_id() -> ResourceId {
        id("aws.ec2.Vpc", "vpc")
    }

    fn subnet_id() -> ResourceId {
        id("aws.ec2.Subnet", "subnet-1")
    }

    fn vpc() -> Resource {
        Resource::new("aws.ec2.Vpc", "vpc").with_literal("cidr_block", "10.0.0.0/16")
    }

    fn subnet(cidr: &str) -> Resource {
        Resource::new("aws.ec2.Subnet", "subnet-1")
            .with_attribute("vpc_id", vpc_id().output("id"))
            .with_literal("cidr_block", cidr)
    }

    fn applied_state() -> StateSnapshot {
        StateSnapshot::new()
            .with_resource(
                vpc_id(),
                ResourceState::new(AttributeMap::new())
                    .with_attribute("cidr_block", "10.0.0.0/16")
                    .with_output("id", "vpc-123"),
            )
            .with_resource(
                subnet_id(),
                ResourceState::new(AttributeMap::new())
                    .with_attribute("vpc_id", "vpc-123")
                    .with_attribute("cidr_block", "10.0.1.0/24")
                    .with_output("id", "subnet-456")
                    .with_dependency(vpc_id()),
            )
    }

    fn planner(resources: Vec<Resource>) -> Planner {
        let mut planner = Planner::new();
        for r in resources {
            planner.register(r).unwrap();
        }
        planner
    }

    fn ops(plan: &Plan) -> Vec<(String, Operation)> {
        plan.entries
            .iter()
            .map(|e| (e.resource_id.to_string(), e.operation))
            .collect()
    }

    #[test]
    fn test_empty_state_creates_in_dependency_order() {
        // Subnet declared first; it must still come after the VPC it references.
        let plan = planner(vec![subnet("10.0.1.0/24"), vpc()])
            .plan(&StateSnapshot::new())
            .unwrap();

        assert_eq!(
            ops(&plan),
            vec![
                (String::from("aws.ec2.Vpc.vpc"), Operation::Create),
                (String::from("aws.ec2.Subnet.subnet-1"), Operation::Create),
            ]
        );
        assert_eq!(plan.entries[1].depends_on, vec![0]);

        let vpc_ref = plan.entries[1]
            .changes
            .iter()
            .find(|c| c.name == "vpc_id")
            .unwrap();
        assert_eq!(vpc_ref.after, DiffValue::Unknown(vpc_id().output("id")));
    }

    #[test]
    fn test_immutable_cidr_change_replaces_subnet() {
        let plan = planner(vec![vpc(), subnet("10.0.9.0/24")])
            .plan(&applied_state())
            .unwrap();

        assert_eq!(
            ops(&plan),
            vec![(String::from("aws.ec2.Subnet.subnet-1"), Operation::Replace)]
        );
        assert_eq!(plan.entries[0].reason, "cidr_block forces replacement");
        assert!(plan.entries[0].depends_on.is_empty());
    }

    #[test]
    fn test_no_changes_yields_empty_plan() {
        let plan = planner(vec![vpc(), subnet("10.0.1.0/24")])
            .plan(&applied_state())
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_replacement_cascades_through_unknown_references() {
        let changed_vpc = Resource::new("aws.ec2.Vpc", "vpc").with_literal("cidr_block", "10.1.0.0/16");
        let plan = planner(vec![changed_vpc, subnet("10.0.1.0/24")])
            .plan(&applied_state())
            .unwrap();

        assert_eq!(
            ops(&plan),
            vec![
                (String::from("aws.ec2.Vpc.vpc"), Operation::Replace),
                (String::from("aws.ec2.Subnet.subnet-1"), Operation::Replace),
            ]
        );
        assert_eq!(plan.entries[1].reason, "vpc_id forces replacement");
    }

    #[test]
    fn test_update_keeps_references_known() {
        let tagged_vpc = vpc().with_literal("tags", json!({"Name": "main"}));
        let plan = planner(vec![tagged_vpc, subnet("10.0.1.0/24")])
            .plan(&applied_state())
            .unwrap();

        assert_eq!(ops(&plan), vec![(String::from("aws.ec2.Vpc.vpc"), Operation::Update)]);
    }

    #[test]
    fn test_cycle_is_fatal() {
        let a = Resource::new("t", "a").with_attribute("x", id("t", "b").output("id"));
        let b = Resource::new("t", "b").with_attribute("x", id("t", "a").output("id"));

        let err = planner(vec![a, b]).plan(&StateSnapshot::new()).unwrap_err();
        let InfraError::Graph(GraphError::CyclicDependency { cycle }) = err else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle, vec![id("t", "a"), id("t", "b"), id("t", "a")]);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let build = || {
            planner(vec![
                Resource::new("t", "c"),
                subnet("10.0.1.0/24"),
                Resource::new("t", "a"),
                vpc(),
            ])
            .plan(&StateSnapshot::new())
            .unwrap()
        };
        let (p1, p2) = (build(), build());
        assert_eq!(p1.to_json().unwrap(), p2.to_json().unwrap());
        assert_eq!(p1.fingerprint(), p2.fingerprint());
        assert_eq!(
            ops(&p1).into_iter().map(|(id, _)| id).collect::<Vec<_>>(),
            vec!["t.c", "t.a", "aws.ec2.Vpc.vpc", "aws.ec2.Subnet.subnet-1"]
        );
    }

    #[test]
    fn test_orphans_are_deleted_dependents_first() {
        let plan = planner(vec![]).plan(&applied_state()).unwrap();

        assert_eq!(
            ops(&plan),
            vec![
                (String::from("aws.ec2.Subnet.subnet-1"), Operation::Delete),
                (String::from("aws.ec2.Vpc.vpc"), Operation::Delete),
            ]
        );
        assert_eq!(plan.entries[1].depends_on, vec![0]);
        assert_eq!(plan.entries[0].reason, "no longer declared");
    }

    #[test]
    fn test_declared_absent_is_deleted_after_moving_dependents() {
        // Subnet moves to a new VPC; the old one is declared absent.
        let new_vpc = Resource::new("aws.ec2.Vpc", "next").with_literal("cidr_block", "10.0.0.0/16");
        let moved = Resource::new("aws.ec2.Subnet", "subnet-1")
            .with_attribute("vpc_id", id("aws.ec2.Vpc", "next").output("id"))
            .with_literal("cidr_block", "10.0.1.0/24");
        let old = vpc().absent();

        let plan = planner(vec![old, new_vpc, moved]).plan(&applied_state()).unwrap();

        assert_eq!(
            ops(&plan),
            vec![
                (String::from("aws.ec2.Vpc.next"), Operation::Create),
                (String::from("aws.ec2.Subnet.subnet-1"), Operation::Replace),
                (String::from("aws.ec2.Vpc.vpc"), Operation::Delete),
            ]
        );
        assert_eq!(plan.entries[2].depends_on, vec![1]);
        assert_eq!(plan.entries[2].reason, "declared absent");
    }

    #[test]
    fn test_absent_and_not_in_state_is_noop() {
        let plan = planner(vec![Resource::new("t", "gone").absent()])
            .plan(&StateSnapshot::new())
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_present_depending_on_absent_is_fatal() {
        let err = planner(vec![vpc().absent(), subnet("10.0.1.0/24")])
            .plan(&applied_state())
            .unwrap_err();
        assert!(matches!(
            err,
            InfraError::Plan(PlanError::DependsOnAbsent { ref id, ref dependency })
                if *id == subnet_id() && *dependency == vpc_id()
        ));
    }

    #[test]
    fn test_noop_resources_are_skipped_through() {
        // vpc changes in place, subnet is unchanged, instance is new.
        let tagged_vpc = vpc().with_literal("tags", json!({"Name": "main"}));
        let mut p = planner(vec![tagged_vpc, subnet("10.0.1.0/24")]);
        p.register(Resource::new("aws.ec2.Instance", "web").with_attribute("subnet_id", subnet_id().output("id")))
            .unwrap();
        p.link(&id("aws.ec2.Instance", "web"), &vpc_id()).unwrap();

        let plan = p.plan(&applied_state()).unwrap();
        assert_eq!(
            ops(&plan),
            vec![
                (String::from("aws.ec2.Vpc.vpc"), Operation::Update),
                (String::from("aws.ec2.Instance.web"), Operation::Create),
            ]
        );
        assert_eq!(plan.entries[1].depends_on, vec![0]);
        assert_eq!(
            plan.entries[1].changes[0].after,
            DiffValue::Known(json!("subnet-456"))
        );
        assert_eq!(plan.waves(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_secrets_are_fingerprinted_and_required() {
        let db = Resource::new("aws.rds.Instance", "db")
            .with_literal("engine", "mysql")
            .with_attribute("password", Expr::secret("DB_PASSWORD"));

        let missing = planner(vec![db.clone()])
            .with_secrets(Arc::new(StaticSecretSource::new()))
            .plan(&StateSnapshot::new())
            .unwrap_err();
        assert!(matches!(missing, InfraError::Plan(PlanError::MissingSecret { .. })));

        let plan = planner(vec![db])
            .with_secrets(Arc::new(StaticSecretSource::new().with("DB_PASSWORD", "hunter2")))
            .plan(&StateSnapshot::new())
            .unwrap();
        let json = plan.to_json().unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("sha256:"));
        assert!(json.contains("(sensitive)"));
        assert!(plan.entries[0].changes.iter().any(|c| c.sensitive));
    }

    #[test]
    fn test_keyed_fingerprint_matches_state_recorded_with_same_key() {
        let db = || Resource::new("aws.rds.Instance", "db").with_attribute("password", Expr::secret("DB_PASSWORD"));
        let keyed = |key: &str| {
            Arc::new(
                StaticSecretSource::new()
                    .with("DB_PASSWORD", "hunter2")
                    .with_fingerprint_key(key),
            )
        };
        let fingerprint = Fingerprinter::new().fingerprint_secret_keyed(Some("k1"), "hunter2");
        let mut recorded = ResourceState::default().with_attribute("password", fingerprint.as_str());
        recorded.sensitive.insert(String::from("password"));
        let state = StateSnapshot::new().with_resource(id("aws.rds.Instance", "db"), recorded);

        let same = planner(vec![db()]).with_secrets(keyed("k1")).plan(&state).unwrap();
        assert!(same.is_empty());

        let rotated = planner(vec![db()]).with_secrets(keyed("k2")).plan(&state).unwrap();
        assert_eq!(ops(&rotated), vec![(String::from("aws.rds.Instance.db"), Operation::Update)]);
    }

    #[test]
    fn test_outputs_known_now_or_after_apply() {
        let mut planner = planner(vec![vpc(), subnet("10.0.2.0/24")]);
        planner.export("vpc_id", vpc_id().output("id"));
        planner.export("subnet_id", subnet_id().output("id"));

        let plan = planner.plan(&applied_state()).unwrap();
        assert_eq!(plan.outputs["vpc_id"], DiffValue::Known(json!("vpc-123")));
        assert_eq!(plan.outputs["subnet_id"], DiffValue::Unknown(subnet_id().output("id")));

        let fresh = planner.plan(&StateSnapshot::new()).unwrap();
        assert_eq!(fresh.outputs["vpc_id"], DiffValue::Unknown(vpc_id().output("id")));
    }

    #[test]
    fn test_outputs_must_target_declared_present_resources() {
        let mut dangling = planner(vec![vpc()]);
        dangling.export("gw", id("aws.ec2.Igw", "gw").output("id"));
        assert!(matches!(
            dangling.plan(&StateSnapshot::new()).unwrap_err(),
            InfraError::Graph(GraphError::UnknownResource { .. })
        ));

        let mut absent = planner(vec![vpc().absent()]);
        absent.export("vpc_id", vpc_id().output("id"));
        assert!(matches!(
            absent.plan(&applied_state()).unwrap_err(),
            InfraError::Plan(PlanError::OutputOfAbsent { .. })
        ));
    }

    #[test]
    fn test_resolve_outputs_reads_state() {
        let mut planner = planner(vec![vpc()]);
        planner.export("vpc_id", vpc_id().output("id"));

        let resolved = planner.resolve_outputs(&applied_state()).unwrap();
        assert_eq!(resolved["vpc_id"], json!("vpc-123"));
        assert!(matches!(
            planner.resolve_outputs(&StateSnapshot::new()),
            Err(ExecutionError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_incompatible_attribute_is_fatal() {
        let state = StateSnapshot::new().with_resource(
            vpc_id(),
            ResourceState::default().with_attribute("cidr_block", json!(["10.0.0.0/16"])),
        );
        let err = planner(vec![vpc()]).plan(&state).unwrap_err();
        assert!(matches!(err, InfraError::Plan(PlanError::IncompatibleAttribute { .. })));
    }

    #[test]
    fn test_from_manifest_links_depends_on_and_schema() {
        let manifest = ManifestParser::new()
            .parse_yaml(
                r#"
project:
  name: ecs
schema:
  custom.Queue:
    immutable: [fifo]
resources:
  - type: aws.ecs.Service
    name: web
    depends_on: [aws.lb.Listener.http]
    attributes:
      desired_count: 3
  - type: aws.lb.Listener
    name: http
    attributes:
      port: 80
  - type: custom.Queue
    name: jobs
    attributes:
      fifo: true
outputs:
  queue_arn: "${custom.Queue.jobs.arn}"
"#,
                None,
            )
            .unwrap();

        let planner = Planner::from_manifest(&manifest).unwrap();
        let plan = planner.plan(&StateSnapshot::new()).unwrap();
        assert_eq!(
            ops(&plan).into_iter().map(|(id, _)| id).collect::<Vec<_>>(),
            vec!["aws.lb.Listener.http", "aws.ecs.Service.web", "custom.Queue.jobs"]
        );
        assert_eq!(
            plan.outputs["queue_arn"],
            DiffValue::Unknown(id("custom.Queue", "jobs").output("arn"))
        );

        let state = StateSnapshot::new().with_resource(
            id("custom.Queue", "jobs"),
            ResourceState::default().with_attribute("fifo", false),
        );
        let plan = planner.plan(&state).unwrap();
        assert_eq!(plan.operation_for(&id("custom.Queue", "jobs")), Some(Operation::Replace));
    }
}
