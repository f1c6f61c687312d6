// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Halldyll Infra
//!
//! A declarative resource-dependency graph builder and convergence planner.
//!
//! ## Overview
//!
//! Halldyll Infra turns a set of declared cloud resources into an ordered,
//! dependency-respecting plan that converges real infrastructure on the
//! declarations:
//!
//! - Declare typed resources whose attributes may reference other resources' outputs
//! - Build and order the dependency graph, rejecting cycles and dangling links
//! - Diff declarations against the last recorded state
//! - Classify every resource as create, update, replace, delete or no-op
//! - Drive an injected provider through the plan and record the results
//!
//! ## Architecture
//!
//! 1. **Declarations**: loaded from `halldyll.infra.yaml` or registered in code
//! 2. **Prior State**: a [`state::StateSnapshot`] recorded by earlier applies
//! 3. **Planner**: compares both and emits a deterministic [`planner::Plan`]
//! 4. **Executor**: applies the plan through a [`planner::Provider`]
//!
//! ## Modules
//!
//! - [`config`]: Manifest parsing, validation, secret injection and hashing
//! - [`graph`]: Resource identifiers, references and the dependency graph
//! - [`planner`]: Replacement schema, diffing, plan assembly and execution
//! - [`state`]: Prior-state snapshots
//! - [`output`]: Text and JSON rendering
//! - [`error`]: Error types
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: shop
//!   environment: prod
//!   region: eu-west-1
//!
//! resources:
//!   - type: aws.ec2.Vpc
//!     name: main
//!     attributes:
//!       cidr_block: 10.0.0.0/16
//!   - type: aws.ec2.Subnet
//!     name: subnet-1
//!     attributes:
//!       vpc_id: ${aws.ec2.Vpc.main.id}
//!       cidr_block: 10.0.1.0/24
//!   - type: aws.rds.Instance
//!     name: db
//!     attributes:
//!       password: { secret: DB_PASSWORD }
//!
//! outputs:
//!   subnet_id: ${aws.ec2.Subnet.subnet-1.id}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod graph;
pub mod output;
pub mod planner;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{Manifest, ManifestParser, ManifestValidator, SecretSource};
pub use error::{InfraError, Result};
pub use graph::{Expr, Resource, ResourceGraph, ResourceId};
pub use output::{OutputFormat, PlanFormatter};
pub use planner::{Operation, Plan, PlanExecutor, Planner, Provider, Schema};
pub use state::StateSnapshot;
