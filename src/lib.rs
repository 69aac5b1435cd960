// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
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

//! # Stackform
//!
//! A declarative, idempotent infrastructure provisioning engine.
//!
//! ## Overview
//!
//! Stackform converges remote infrastructure toward a declared stack
//! document, allowing you to:
//!
//! - Define a stack of typed resources as code in a YAML document
//! - Wire resources together with `${logical_id.attribute}` references
//! - Plan before applying: every run shows exactly what would change
//! - Apply changes in dependency order with bounded concurrency
//! - Re-run after a partial failure and pick up where the run stopped
//!
//! ## Architecture
//!
//! The engine is built around **desired state convergence**:
//!
//! 1. **Desired state**: the resource graph built from `stack.yaml`
//! 2. **Baseline**: the persisted snapshot of the last applied run
//! 3. **Planner**: diffs the two and orders the changes
//! 4. **Executor**: applies the plan through the provider API,
//!    recording each result to state as it lands
//!
//! ## Modules
//!
//! - [`document`]: Stack document parsing
//! - [`graph`]: Typed resource graph construction and validation
//! - [`registry`]: Resource kind capabilities (immutable properties,
//!   replace strategies)
//! - [`planner`]: Diff computation and dependency scheduling
//! - [`provider`]: Provider API client
//! - [`executor`]: Bounded-concurrency plan execution
//! - [`state`]: State snapshot storage and locking
//! - [`engine`]: Run orchestration
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! stack:
//!   name: my-app
//!   environment: prod
//!
//! resources:
//!   - id: net
//!     kind: network.vpc
//!     properties:
//!       max_azs: 2
//!   - id: db
//!     kind: database.instance
//!     properties:
//!       engine: postgres
//!       vpc_id: ${net.id}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod document;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod registry;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use document::{DocumentParser, PropertyHasher, StackDocument};
pub use engine::Engine;
pub use error::{Result, StackformError};
pub use executor::{ApplyExecutor, CancelFlag, OpOutcome, RunReport, RunStatus};
pub use graph::{GraphBuilder, PropertyValue, Reference, ResourceGraph};
pub use planner::{ChangeSet, DiffEngine, ExecutionPlan, OperationKind, Scheduler};
pub use provider::{HttpProvider, Provider};
pub use registry::{ReplaceStrategy, ResourceKindRegistry};
pub use state::{LocalStateStore, StateSnapshot, StateStore};
