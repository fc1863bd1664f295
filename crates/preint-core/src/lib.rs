//! Pretested integration core library
//!
//! Integrates a verified feature branch into a shared integration branch,
//! never leaving that branch in a partial or racy state. Re-exports the
//! components a host needs to drive one run.

pub mod audit;
pub mod config;
pub mod domain;
pub mod eligibility;
pub mod env;
pub mod fakes;
pub mod git;
pub mod host;
pub mod messages;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod strategy;
pub mod telemetry;
pub mod workspace;

pub use audit::{AuditLog, AuditRecord};
pub use config::{IntegrationConfig, RemoteConfig, StrategyConfig};
pub use domain::{
    BranchReference, FailureKind, IntegrationContext, Outcome, PreintError, Result, Revision,
    Stage, TriggeredChange,
};
pub use eligibility::{Eligibility, EligibilityEvaluator};
pub use env::{expand, Environment};
pub use git::{GitCli, GitClient, GitError};
pub use host::{BuildResult, BuildRun, LocalRun};
pub use orchestrator::{IntegrationOrchestrator, IntegrationReport};
pub use strategy::{AccumulatedStrategy, IntegrationStrategy, SquashStrategy, StrategyRegistry};
pub use workspace::WorkspaceController;

pub use metrics::METRICS;
pub use obs::{
    emit_rollback_failed, emit_run_finished, emit_run_started, emit_stage, run_span,
    IntegrationSpan,
};
pub use telemetry::init_tracing;

/// preint version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
