//! Domain models for pretested integration.
//!
//! Canonical definitions for the core entities:
//! - `BranchReference`: a branch within a named remote
//! - `TriggeredChange`: the change that caused the run
//! - `IntegrationContext`: per-run aggregate handed to strategies
//! - `Outcome`: the tagged result of a run

pub mod branch;
pub mod change;
pub mod context;
pub mod error;
pub mod outcome;

// Re-export main types and errors
pub use branch::BranchReference;
pub use change::{Revision, TriggeredChange};
pub use context::IntegrationContext;
pub use error::{FailureKind, PreintError, Result};
pub use outcome::{Outcome, Stage};
