//! Planning module for convergence operations.
//!
//! This module compares the declared resource graph against a prior state
//! snapshot, produces an ordered [`Plan`], and drives a [`Provider`] through
//! it.

mod diff;
mod engine;
mod executor;
mod plan;
mod provider;
mod schema;

pub use diff::{value_kind, AttributeChange, DiffEngine, DiffValue, ResourceDiff};
pub use engine::Planner;
pub use executor::{EntryResult, ExecutionResult, Outcome, PlanExecutor};
pub use plan::{Operation, Plan, PlanEntry, PlanSummary};
pub use provider::{OperationRequest, Provider};
pub use schema::Schema;
