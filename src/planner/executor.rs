//! Plan executor for applying plans through a [`Provider`].
//!
//! This module drives a provider once per plan entry, in plan order,
//! resolving deferred references from the outputs of completed entries and
//! recording every success into the state snapshot.

use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Fingerprinter, SecretSource};
use crate::error::{ExecutionError, InfraError, ProviderError, Result};
use crate::graph::{AttributeMap, Evaluated, Reference, ResourceId, SecretRef};
use crate::state::{ResourceState, StateSnapshot};

use super::plan::{Operation, Plan, PlanEntry};
use super::provider::{OperationRequest, Provider};

/// Executor for plans.
pub struct PlanExecutor<'a> {
    /// Provider performing the operations.
    provider: &'a dyn Provider,
    /// Source of clear-text secrets.
    secrets: Arc<dyn SecretSource>,
    /// Whether to continue on errors.
    continue_on_error: bool,
    /// Upper bound on a single provider call.
    operation_timeout: Option<Duration>,
    /// Extra attempts after a retryable provider error.
    max_retries: u32,
    /// Base delay between attempts; attempt `n` waits `n` times this.
    retry_delay: Duration,
}

/// How a single entry ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The provider applied the operation.
    Applied {
        /// Outputs returned by the provider.
        outputs: AttributeMap,
    },
    /// The operation failed.
    Failed(ExecutionError),
    /// Not attempted because a dependency failed.
    Skipped,
}

/// Result of executing a single entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryResult {
    /// Entry index in the plan.
    pub index: usize,
    /// Target resource.
    pub resource_id: ResourceId,
    /// Operation attempted.
    pub operation: Operation,
    /// Outcome.
    pub outcome: Outcome,
}

/// Result of executing the entire plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Identifier of this run.
    pub run_id: Uuid,
    /// Individual entry results, in plan order.
    pub results: Vec<EntryResult>,
    /// Number of successful entries.
    pub successful: usize,
    /// Number of failed entries.
    pub failed: usize,
    /// Number of skipped entries (due to dependency failures).
    pub skipped: usize,
    /// Number of entries never reached because execution stopped early.
    pub not_run: usize,
    /// Whether the entire plan succeeded.
    pub success: bool,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(provider: &'a dyn Provider, secrets: Arc<dyn SecretSource>) -> Self {
        Self {
            provider,
            secrets,
            continue_on_error: false,
            operation_timeout: None,
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Bounds every provider call by `timeout`.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Retries provider errors flagged retryable up to `max_retries` times,
    /// waiting `delay * attempt` before each retry.
    #[must_use]
    pub const fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    /// Executes a plan after checking it against an approved fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PlanError::StalePlan`] if the plan changed
    /// since approval, and otherwise as [`Self::execute`].
    pub async fn execute_approved(
        &self,
        plan: &Plan,
        fingerprint: &str,
        state: &mut StateSnapshot,
    ) -> Result<ExecutionResult> {
        plan.verify_fingerprint(fingerprint)?;
        self.execute(plan, state).await
    }

    /// Executes a plan, recording results into `state`.
    ///
    /// Provider failures are reported per entry in the returned
    /// [`ExecutionResult`]; entries depending on a failed entry are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the plan is malformed (an entry waits on a
    /// later entry, or a non-delete entry has no declaration).
    pub async fn execute(&self, plan: &Plan, state: &mut StateSnapshot) -> Result<ExecutionResult> {
        let run_id = Uuid::new_v4();
        self.run(plan, state, run_id)
            .instrument(info_span!("execute_plan", %run_id))
            .await
    }

    async fn run(&self, plan: &Plan, state: &mut StateSnapshot, run_id: Uuid) -> Result<ExecutionResult> {
        info!("Executing plan with {} entries", plan.len());

        Self::check_plan(plan)?;

        let mut results: Vec<EntryResult> = Vec::with_capacity(plan.len());
        let mut failed_indices: HashSet<usize> = HashSet::new();

        for (idx, entry) in plan.entries.iter().enumerate() {
            let deps_failed = entry.depends_on.iter().any(|dep| failed_indices.contains(dep));

            let outcome = if deps_failed {
                warn!("Skipping {} due to failed dependencies", entry.resource_id);
                Outcome::Skipped
            } else {
                self.execute_entry(entry, state).await
            };

            let stop = matches!(outcome, Outcome::Failed(_)) && !self.continue_on_error;
            if !matches!(outcome, Outcome::Applied { .. }) {
                failed_indices.insert(idx);
            }

            results.push(EntryResult {
                index: idx,
                resource_id: entry.resource_id.clone(),
                operation: entry.operation,
                outcome,
            });

            if stop {
                error!("Stopping execution after failure on {}", entry.resource_id);
                break;
            }
        }

        let count = |pred: fn(&Outcome) -> bool| results.iter().filter(|r| pred(&r.outcome)).count();
        let successful = count(|o| matches!(o, Outcome::Applied { .. }));
        let failed = count(|o| matches!(o, Outcome::Failed(_)));
        let skipped = count(|o| matches!(o, Outcome::Skipped));
        let not_run = plan.len() - results.len();

        let result = ExecutionResult {
            run_id,
            successful,
            failed,
            skipped,
            not_run,
            success: failed == 0 && skipped == 0 && not_run == 0,
            results,
        };

        info!("{result}");
        Ok(result)
    }

    /// Rejects plans the executor cannot run in order.
    fn check_plan(plan: &Plan) -> Result<()> {
        for (idx, entry) in plan.entries.iter().enumerate() {
            if let Some(&dep) = entry.depends_on.iter().find(|&&dep| dep >= idx) {
                return Err(InfraError::Execution(ExecutionError::Aborted {
                    reason: format!("entry {idx} ({}) waits on later entry {dep}", entry.resource_id),
                }));
            }
            if entry.operation != Operation::Delete && entry.resource.is_none() {
                return Err(InfraError::Execution(ExecutionError::Aborted {
                    reason: format!("entry {idx} ({}) has no declaration", entry.resource_id),
                }));
            }
        }
        Ok(())
    }

    /// Executes a single entry.
    async fn execute_entry(&self, entry: &PlanEntry, state: &mut StateSnapshot) -> Outcome {
        info!("Applying {} to {}", entry.operation, entry.resource_id);

        let (request, recorded) = match self.build_request(entry, state) {
            Ok(built) => built,
            Err(e) => {
                error!("Cannot apply {}: {e}", entry.resource_id);
                return Outcome::Failed(e);
            }
        };

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {} for {}", self.max_retries, entry.resource_id);
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            let called = self.call_provider(entry, &request).await;
            match called {
                Ok(outputs) => {
                    Self::record(entry, request, recorded, &outputs, state);
                    info!("Applied {} to {}", entry.operation, entry.resource_id);
                    return Outcome::Applied { outputs };
                }
                Err(CallError::Provider(e)) if e.retryable && attempt < self.max_retries => {
                    warn!("Retryable failure on {}: {e}", entry.resource_id);
                    attempt += 1;
                }
                Err(CallError::Provider(e)) => {
                    error!("Provider failed on {}: {e}", entry.resource_id);
                    return Outcome::Failed(ExecutionError::Provider {
                        id: entry.resource_id.clone(),
                        message: e.message,
                    });
                }
                Err(CallError::TimedOut(after)) => {
                    error!("{} timed out after {after:?}", entry.resource_id);
                    return Outcome::Failed(ExecutionError::Timeout {
                        id: entry.resource_id.clone(),
                        after,
                    });
                }
            }
        }
    }

    /// Performs one provider call, bounded by the operation timeout.
    async fn call_provider(
        &self,
        entry: &PlanEntry,
        request: &OperationRequest,
    ) -> std::result::Result<AttributeMap, CallError> {
        debug!("Calling provider for {}", entry.resource_id);
        let call = self.provider.apply(request);
        match self.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(CallError::Provider),
                Err(_) => Err(CallError::TimedOut(limit)),
            },
            None => call.await.map_err(CallError::Provider),
        }
    }

    /// Resolves an entry into a concrete request.
    ///
    /// Also returns the attributes to record, with secret material replaced
    /// by the same fingerprints the planner compares against.
    fn build_request(
        &self,
        entry: &PlanEntry,
        state: &StateSnapshot,
    ) -> std::result::Result<(OperationRequest, AttributeMap), ExecutionError> {
        let prior = state.get(&entry.resource_id).cloned();

        let Some(resource) = entry.resource.as_ref().filter(|_| entry.operation != Operation::Delete) else {
            // Deletes act on what was recorded.
            let recorded = prior.clone().unwrap_or_default();
            let request = OperationRequest {
                resource_id: entry.resource_id.clone(),
                operation: entry.operation,
                attributes: recorded.attributes.clone(),
                sensitive: recorded.sensitive,
                prior,
            };
            return Ok((request, recorded.attributes));
        };

        let lookup = |r: &Reference| -> Option<Value> { state.output(&r.resource, &r.output).cloned() };
        let secret = |s: &SecretRef| -> std::result::Result<Value, ExecutionError> {
            self.secrets
                .resolve(&s.name)
                .map(Value::String)
                .ok_or_else(|| ExecutionError::MissingSecret {
                    id: entry.resource_id.clone(),
                    name: s.name.clone(),
                })
        };

        let fingerprinter = Fingerprinter::new();
        let key = self.secrets.fingerprint_key();
        let fingerprint = |s: &SecretRef| -> std::result::Result<Value, ExecutionError> {
            secret(s).map(|v| match v {
                Value::String(clear) => Value::String(fingerprinter.fingerprint_secret_keyed(key.as_deref(), &clear)),
                other => other,
            })
        };

        let mut attributes = AttributeMap::new();
        let mut recorded = AttributeMap::new();
        let mut sensitive = BTreeSet::new();
        for (name, expr) in &resource.attributes {
            let value = known(entry, expr.evaluate(&lookup, &secret)?)?;
            if expr.is_sensitive() {
                sensitive.insert(name.clone());
                recorded.insert(name.clone(), known(entry, expr.evaluate(&lookup, &fingerprint)?)?);
            } else {
                recorded.insert(name.clone(), value.clone());
            }
            attributes.insert(name.clone(), value);
        }

        debug!("Resolved {} attributes for {}", attributes.len(), entry.resource_id);
        let request = OperationRequest {
            resource_id: entry.resource_id.clone(),
            operation: entry.operation,
            attributes,
            sensitive,
            prior,
        };
        Ok((request, recorded))
    }

    /// Records a successful operation.
    fn record(entry: &PlanEntry, request: OperationRequest, attributes: AttributeMap, outputs: &AttributeMap, state: &mut StateSnapshot) {
        if entry.operation == Operation::Delete {
            state.remove(&entry.resource_id);
            return;
        }

        state.record(
            entry.resource_id.clone(),
            ResourceState {
                attributes,
                outputs: outputs.clone(),
                dependencies: entry.dependencies.clone(),
                sensitive: request.sensitive,
                applied_at: Some(Utc::now()),
            },
        );
    }
}

/// Failure of a single provider call.
enum CallError {
    Provider(ProviderError),
    TimedOut(Duration),
}

/// Unwraps a fully known value; deferred values cannot be sent to a provider.
fn known(entry: &PlanEntry, value: Evaluated) -> std::result::Result<Value, ExecutionError> {
    match value {
        Evaluated::Known(v) => Ok(v),
        Evaluated::Deferred(reference) => Err(ExecutionError::UnresolvedReference {
            id: entry.resource_id.clone(),
            reference: reference.to_string(),
        }),
    }
}

impl std::fmt::Debug for PlanExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("secrets", &self.secrets)
            .field("continue_on_error", &self.continue_on_error)
            .field("operation_timeout", &self.operation_timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ExecutionResult {
    /// Returns true if all entries succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.failed == 0 && self.skipped == 0
    }

    /// Returns the result for a plan entry.
    #[must_use]
    pub fn result_for(&self, index: usize) -> Option<&EntryResult> {
        self.results.iter().find(|r| r.index == index)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} entries: {} successful, {} failed, {} skipped, {} not run",
            self.results.len(),
            self.successful,
            self.failed,
            self.skipped,
            self.not_run
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticSecretSource;
    use crate::graph::{Expr, Resource};
    use crate::planner::Planner;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use std::sync::Mutex;

    mock! {
        Cloud {}

        #[async_trait]
        impl Provider for Cloud {
            async fn apply(&self, request: &OperationRequest) -> std::result::Result<AttributeMap, ProviderError>;
        }
    }

    /// Records calls and hands out `<name>-id` outputs.
    #[derive(Default)]
    struct RecordingCloud {
        calls: Mutex<Vec<OperationRequest>>,
        fail_on: Option<ResourceId>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Provider for RecordingCloud {
        async fn apply(&self, request: &OperationRequest) -> std::result::Result<AttributeMap, ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.lock().unwrap().push(request.clone());
            if self.fail_on.as_ref() == Some(&request.resource_id) {
                return Err(ProviderError::new("quota exceeded"));
            }
            let mut outputs = AttributeMap::new();
            outputs.insert(String::from("id"), json!(format!("{}-id", request.resource_id.name)));
            Ok(outputs)
        }
    }

    fn secrets() -> Arc<dyn SecretSource> {
        Arc::new(StaticSecretSource::new().with("DB_PASSWORD", "hunter2"))
    }

    fn stack() -> Planner {
        let vpc = ResourceId::new("aws.ec2.Vpc", "vpc");
        let subnet = ResourceId::new("aws.ec2.Subnet", "subnet-1");
        let mut planner = Planner::new().with_secrets(secrets());
        planner
            .register(Resource::new("aws.ec2.Vpc", "vpc").with_literal("cidr_block", "10.0.0.0/16"))
            .unwrap();
        planner
            .register(
                Resource::new("aws.ec2.Subnet", "subnet-1")
                    .with_attribute("vpc_id", vpc.output("id"))
                    .with_literal("cidr_block", "10.0.1.0/24"),
            )
            .unwrap();
        planner
            .register(
                Resource::new("aws.rds.Instance", "db")
                    .with_literal("engine", "mysql")
                    .with_attribute("subnet_ids", Expr::List(vec![Expr::Reference(subnet.output("id"))]))
                    .with_attribute("password", Expr::secret("DB_PASSWORD")),
            )
            .unwrap();
        planner
    }

    #[tokio::test]
    async fn test_execute_resolves_references_and_records_state() {
        let planner = stack();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let cloud = RecordingCloud::default();
        let result = PlanExecutor::new(&cloud, planner.secrets())
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(result.all_successful());
        assert_eq!(result.successful, 3);

        let calls = cloud.calls.lock().unwrap();
        assert_eq!(calls[1].attribute("vpc_id"), Some(&json!("vpc-id")));
        assert_eq!(calls[2].attribute("subnet_ids"), Some(&json!(["subnet-1-id"])));
        assert_eq!(calls[2].attribute("password"), Some(&json!("hunter2")));

        let db = state.get(&ResourceId::new("aws.rds.Instance", "db")).unwrap();
        assert!(db.attributes["password"].as_str().unwrap().starts_with("sha256:"));
        assert!(db.sensitive.contains("password"));
        assert!(db.applied_at.is_some());
        assert!(db.dependencies.contains(&ResourceId::new("aws.ec2.Subnet", "subnet-1")));
        assert!(!state.to_json().unwrap().contains("hunter2"));

        // Converged: planning again against the recorded state is empty.
        assert!(planner.plan(&state).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stack_outputs_resolve_after_apply() {
        let db = ResourceId::new("aws.rds.Instance", "db");
        let mut planner = stack();
        planner.export("db_id", db.output("id"));
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();
        assert_eq!(plan.outputs["db_id"], crate::planner::DiffValue::Unknown(db.output("id")));

        let cloud = RecordingCloud::default();
        PlanExecutor::new(&cloud, planner.secrets())
            .execute(&plan, &mut state)
            .await
            .unwrap();

        let outputs = planner.resolve_outputs(&state).unwrap();
        assert_eq!(outputs["db_id"], json!("db-id"));
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_when_continuing() {
        let planner = stack();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let cloud = RecordingCloud {
            fail_on: Some(ResourceId::new("aws.ec2.Vpc", "vpc")),
            ..RecordingCloud::default()
        };
        let result = PlanExecutor::new(&cloud, planner.secrets())
            .with_continue_on_error(true)
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!((result.failed, result.skipped, result.not_run), (1, 2, 0));
        assert!(matches!(
            result.result_for(0).unwrap().outcome,
            Outcome::Failed(ExecutionError::Provider { .. })
        ));
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_failure_stops_by_default() {
        let mut planner = Planner::new();
        planner.register(Resource::new("t", "a")).unwrap();
        planner.register(Resource::new("t", "b")).unwrap();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let cloud = RecordingCloud {
            fail_on: Some(ResourceId::new("t", "a")),
            ..RecordingCloud::default()
        };
        let result = PlanExecutor::new(&cloud, planner.secrets())
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert_eq!((result.failed, result.skipped, result.not_run), (1, 0, 1));
        assert_eq!(cloud.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let mut planner = Planner::new();
        planner.register(Resource::new("t", "slow")).unwrap();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let cloud = RecordingCloud {
            delay: Some(Duration::from_millis(500)),
            ..RecordingCloud::default()
        };
        let result = PlanExecutor::new(&cloud, planner.secrets())
            .with_operation_timeout(Duration::from_millis(10))
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(matches!(
            result.results[0].outcome,
            Outcome::Failed(ExecutionError::Timeout { .. })
        ));
        let message = match &result.results[0].outcome {
            Outcome::Failed(e) => e.to_string(),
            other => format!("{other:?}"),
        };
        assert!(message.ends_with("timed out after 10ms"), "{message}");
    }

    #[tokio::test]
    async fn test_retryable_error_is_retried() {
        let mut planner = Planner::new();
        planner.register(Resource::new("t", "flaky")).unwrap();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let mut cloud = MockCloud::new();
        let mut seq = mockall::Sequence::new();
        cloud
            .expect_apply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::retryable("throttled")));
        cloud
            .expect_apply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(AttributeMap::new()));

        let result = PlanExecutor::new(&cloud, planner.secrets())
            .with_retries(2, Duration::from_millis(1))
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(result.all_successful());
        assert!(state.contains(&ResourceId::new("t", "flaky")));
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut planner = Planner::new();
        planner.register(Resource::new("t", "down")).unwrap();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let mut cloud = MockCloud::new();
        cloud
            .expect_apply()
            .times(3)
            .returning(|_| Err(ProviderError::retryable("throttled")));

        let result = PlanExecutor::new(&cloud, planner.secrets())
            .with_retries(2, Duration::from_millis(1))
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let mut planner = Planner::new();
        planner.register(Resource::new("t", "bad")).unwrap();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let mut cloud = MockCloud::new();
        cloud
            .expect_apply()
            .times(1)
            .returning(|_| Err(ProviderError::new("invalid cidr")));

        let result = PlanExecutor::new(&cloud, planner.secrets())
            .with_retries(3, Duration::from_millis(1))
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(matches!(
            result.results[0].outcome,
            Outcome::Failed(ExecutionError::Provider { ref message, .. }) if message == "invalid cidr"
        ));
    }

    #[tokio::test]
    async fn test_deletes_go_through_provider_and_leave_state() {
        let vpc = ResourceId::new("aws.ec2.Vpc", "old");
        let mut state = StateSnapshot::new().with_resource(
            vpc.clone(),
            ResourceState::default()
                .with_attribute("cidr_block", "10.0.0.0/16")
                .with_output("id", "vpc-1"),
        );
        let plan = Planner::new().plan(&state).unwrap();

        let mut cloud = MockCloud::new();
        cloud
            .expect_apply()
            .withf(|req| req.operation == Operation::Delete && req.attribute("cidr_block") == Some(&json!("10.0.0.0/16")))
            .times(1)
            .returning(|_| Ok(AttributeMap::new()));

        let result = PlanExecutor::new(&cloud, Arc::new(StaticSecretSource::new()))
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(result.all_successful());
        assert!(!state.contains(&vpc));
        assert_eq!(state.serial, 1);
    }

    #[tokio::test]
    async fn test_missing_secret_at_apply_fails_entry() {
        let planner = stack();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let cloud = RecordingCloud::default();
        let result = PlanExecutor::new(&cloud, Arc::new(StaticSecretSource::new()))
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert_eq!(result.successful, 2);
        assert!(matches!(
            result.result_for(2).unwrap().outcome,
            Outcome::Failed(ExecutionError::MissingSecret { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_plan_is_rejected() {
        let planner = stack();
        let mut state = StateSnapshot::new();
        let plan = planner.plan(&state).unwrap();

        let cloud = MockCloud::new();
        let err = PlanExecutor::new(&cloud, planner.secrets())
            .execute_approved(&plan, "deadbeef", &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, InfraError::Plan(crate::error::PlanError::StalePlan { .. })));
    }

    #[tokio::test]
    async fn test_malformed_plan_aborts() {
        let mut entry = PlanEntry::new(ResourceId::new("t", "a"), Operation::Delete, "test");
        entry.depends_on = vec![0];
        let plan = Plan {
            entries: vec![entry],
            ..Plan::default()
        };

        let cloud = MockCloud::new();
        let err = PlanExecutor::new(&cloud, Arc::new(StaticSecretSource::new()))
            .execute(&plan, &mut StateSnapshot::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InfraError::Execution(ExecutionError::Aborted { .. })));
    }
}
