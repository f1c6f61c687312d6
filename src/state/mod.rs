//! State module for the Halldyll infrastructure planner.
//!
//! This module provides the prior-state snapshot the planner diffs against:
//! last applied attributes, provider outputs and recorded dependencies.

mod types;

pub use types::{ResourceState, STATE_VERSION, StateSnapshot};
