//! Planning module for provisioning runs.
//!
//! This module compares the desired resource graph against the baseline
//! snapshot and turns the resulting change set into a dependency-ordered
//! execution plan.

mod diff;
mod schedule;

pub use diff::{ChangeEntry, ChangeSet, DiffEngine, OperationKind, ReplaceRole};
pub use schedule::{ExecutionPlan, ScheduledOp, Scheduler};
