//! Structured observability hooks for the integration run lifecycle.
//!
//! This module provides:
//! - Run-scoped tracing spans: `run_span` for async runs, `IntegrationSpan` RAII guard for sync code
//! - Emission functions for lifecycle events: start, stage reached, finish, rollback failure
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::info;

use crate::domain::outcome::Stage;

/// Span covering one integration attempt, tagged with the run id and the
/// triggered branch. Attach it to the run future with
/// [`tracing::Instrument`] so it survives across `.await` points.
pub fn run_span(run_id: &str, triggered_branch: &str) -> tracing::Span {
    tracing::info_span!(
        "preint.run",
        run_id = %run_id,
        branch = %triggered_branch
    )
}

/// RAII guard that enters the run span for synchronous sections.
///
/// ```ignore
/// let _span = IntegrationSpan::enter(&run_id, "origin/feature/x");
/// // tracing calls below carry run_id and branch
/// ```
pub struct IntegrationSpan {
    _span: tracing::span::EnteredSpan,
}

impl IntegrationSpan {
    pub fn enter(run_id: &str, triggered_branch: &str) -> Self {
        Self {
            _span: run_span(run_id, triggered_branch).entered(),
        }
    }
}

/// Emit event: integration attempt started.
pub fn emit_run_started(run_id: &str, triggered_branch: &str, revision: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        branch = %triggered_branch,
        revision = %revision,
    );
}

/// Emit event: the state machine reached `stage`.
pub fn emit_stage(run_id: &str, stage: Stage) {
    info!(event = "run.stage", run_id = %run_id, stage = stage.as_str());
}

/// Emit event: integration attempt finished.
pub fn emit_run_finished(run_id: &str, outcome: &str, stage: Stage, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        outcome = %outcome,
        stage = stage.as_str(),
        duration_ms = duration_ms,
    );
}

/// Emit event: restoring the workspace after a failure did not succeed (warning level).
pub fn emit_rollback_failed(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.rollback_failed", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_and_events_do_not_panic() {
        let _span = IntegrationSpan::enter("run-1", "origin/feature/x");
        emit_run_started("run-1", "origin/feature/x", "abc123");
        emit_stage("run-1", Stage::Evaluated);
        emit_run_finished("run-1", "Integrated", Stage::Committed, 12);
        emit_rollback_failed("run-1", &"checkout failed");
    }
}
