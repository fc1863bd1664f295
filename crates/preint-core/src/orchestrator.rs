//! Integration orchestrator: the per-run state machine.
//!
//! `Start → Evaluated → WorkspaceReady → StrategyApplied → {Committed | RolledBack}`,
//! with `NotBuilt` for runs that had nothing to integrate.
//!
//! Every error is caught here and turned into exactly one [`Outcome`], one
//! [`BuildResult`] on the host run and, except for nothing-to-do runs,
//! exactly one [`AuditRecord`] attached after the outcome is final. The
//! remote integration branch is only ever advanced by the strategy's
//! conditional push, so failed runs leave it untouched.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::audit::{AuditLog, AuditRecord};
use crate::config::IntegrationConfig;
use crate::domain::branch::BranchReference;
use crate::domain::change::{Revision, TriggeredChange};
use crate::domain::context::IntegrationContext;
use crate::domain::error::{FailureKind, PreintError, Result};
use crate::domain::outcome::{Outcome, Stage};
use crate::eligibility::EligibilityEvaluator;
use crate::git::{GitClient, GitError};
use crate::host::{BuildResult, BuildRun};
use crate::messages;
use crate::metrics::METRICS;
use crate::obs;
use crate::strategy::{IntegrationStrategy, StrategyRegistry};
use crate::workspace::WorkspaceController;

/// What one run ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationReport {
    pub run_id: Uuid,
    pub outcome: Outcome,
    /// Revision reported to the host: the integrated tip on success, the
    /// triggered revision otherwise.
    pub resulting_revision: Revision,
    /// Stage the run ended in.
    pub stage: Stage,
}

impl IntegrationReport {
    pub fn build_result(&self) -> BuildResult {
        build_result_for(&self.outcome)
    }
}

fn build_result_for(outcome: &Outcome) -> BuildResult {
    match outcome {
        Outcome::Integrated { .. } => BuildResult::Success,
        Outcome::NothingToDo { .. } => BuildResult::NotBuilt,
        Outcome::Failed { .. } => BuildResult::Failure,
    }
}

/// Sequences evaluation, workspace preparation, the strategy and outcome
/// handling for one integration target.
pub struct IntegrationOrchestrator {
    config: IntegrationConfig,
    strategy: Arc<dyn IntegrationStrategy>,
    git: Arc<dyn GitClient>,
    audit_log: Option<AuditLog>,
}

impl IntegrationOrchestrator {
    pub fn new(
        config: IntegrationConfig,
        strategy: Arc<dyn IntegrationStrategy>,
        git: Arc<dyn GitClient>,
    ) -> Self {
        Self {
            config,
            strategy,
            git,
            audit_log: None,
        }
    }

    /// Build the strategy named in `config` from `registry`.
    pub fn from_registry(
        config: IntegrationConfig,
        registry: &StrategyRegistry,
        git: Arc<dyn GitClient>,
    ) -> Result<Self> {
        let strategy = registry.create(&config.strategy)?;
        Ok(Self::new(config, strategy, git))
    }

    /// Also append every audit record to `log`.
    pub fn with_audit_log(mut self, log: AuditLog) -> Self {
        self.audit_log = Some(log);
        self
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Run one integration for `change` and report the resulting revision.
    ///
    /// Never fails: every error becomes the run's outcome and build result.
    pub async fn decorate_revision_to_build(
        &self,
        run: &mut dyn BuildRun,
        change: &TriggeredChange,
    ) -> IntegrationReport {
        let run_id = Uuid::new_v4();
        let branch = change
            .select_branch(&self.config.repository_name)
            .unwrap_or_default()
            .to_string();
        let span = obs::run_span(&run_id.to_string(), &branch);
        self.run(run_id, run, change).instrument(span).await
    }

    async fn run(
        &self,
        run_id: Uuid,
        run: &mut dyn BuildRun,
        change: &TriggeredChange,
    ) -> IntegrationReport {
        let started = Instant::now();
        let id = run_id.to_string();
        run.console(&messages::prefixed(format!(
            "Pretested Integration v{}",
            crate::VERSION
        )));
        obs::emit_run_started(&id, &change.branches.join(","), change.revision.as_str());
        obs::emit_stage(&id, Stage::Start);

        let remote_names = self.config.remote_names();
        let evaluated = EligibilityEvaluator::new(&remote_names, run.environment()).evaluate(
            change,
            &self.config.integration_branch,
            &self.config.repository_name,
        );
        let eligibility = match evaluated {
            Ok(eligibility) => eligibility,
            Err(PreintError::NothingToDo(reason)) => {
                let integration = self.configured_integration_branch(run);
                return self
                    .not_built(run, run_id, started, change, &integration, reason, false)
                    .await;
            }
            Err(err) => {
                let ctx = self.fallback_context(run, change);
                let outcome = failed(&err);
                return self.finish(run, run_id, started, Some(&ctx), change, outcome, Stage::Evaluated);
            }
        };
        obs::emit_stage(&id, Stage::Evaluated);

        let credentials_id = self.config.credentials_for(eligibility.repository_name());
        let ctx = IntegrationContext::new(
            eligibility.triggered_branch,
            eligibility.integration_branch,
            credentials_id,
        );
        run.console(&messages::prefixed(format!(
            "Preparing to integrate {} into {}",
            ctx.triggered_branch, ctx.integration_branch
        )));

        let workspace = WorkspaceController::new(self.git.as_ref());
        let base = match workspace.prepare(&ctx.integration_branch).await {
            Ok(base) => base,
            Err(err) => {
                self.roll_back(run, &id, &ctx).await;
                let outcome = failed(&err);
                return self.finish(run, run_id, started, Some(&ctx), change, outcome, Stage::RolledBack);
            }
        };
        let ctx = ctx.with_base(base);
        obs::emit_stage(&id, Stage::WorkspaceReady);

        match self.confirm_triggered(&ctx, change).await {
            Ok(()) => {}
            Err(PreintError::NothingToDo(reason)) => {
                return self
                    .not_built(run, run_id, started, change, &ctx.integration_branch, reason, true)
                    .await;
            }
            Err(err) => {
                self.roll_back(run, &id, &ctx).await;
                let outcome = failed(&err);
                return self.finish(run, run_id, started, Some(&ctx), change, outcome, Stage::RolledBack);
            }
        }

        match self
            .strategy
            .integrate(self.git.as_ref(), change, &ctx)
            .await
        {
            Ok(final_revision) => {
                obs::emit_stage(&id, Stage::StrategyApplied);
                run.console(&messages::prefixed(format!(
                    "Integrated {} into {} as {}",
                    ctx.triggered_branch,
                    ctx.integration_branch,
                    final_revision.short()
                )));
                let outcome = Outcome::Integrated { final_revision };
                self.finish(run, run_id, started, Some(&ctx), change, outcome, Stage::Committed)
            }
            Err(PreintError::NothingToDo(reason)) => {
                self.not_built(run, run_id, started, change, &ctx.integration_branch, reason, true)
                    .await
            }
            Err(err) => {
                self.roll_back(run, &id, &ctx).await;
                let outcome = failed(&err);
                self.finish(run, run_id, started, Some(&ctx), change, outcome, Stage::RolledBack)
            }
        }
    }

    /// The triggered branch must still exist on the freshly fetched remote
    /// and the triggered revision must still be known. Either missing means
    /// the branch was deleted or already integrated.
    async fn confirm_triggered(
        &self,
        ctx: &IntegrationContext,
        change: &TriggeredChange,
    ) -> Result<()> {
        let qualified = ctx.triggered_branch.qualified();
        for rev in [qualified.as_str(), change.revision.as_str()] {
            match self.git.rev_parse(rev).await {
                Ok(_) => {}
                Err(GitError::UnknownRevision(_)) => {
                    return Err(PreintError::NothingToDo(messages::no_relevant_change(
                        &qualified,
                    )));
                }
                Err(e) => {
                    return Err(PreintError::EstablishingWorkspaceFailed(format!(
                        "resolving {rev}: {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Nothing to integrate: leave the workspace on the integration branch's
    /// clean tip and mark the run not built. No audit record.
    #[allow(clippy::too_many_arguments)]
    async fn not_built(
        &self,
        run: &mut dyn BuildRun,
        run_id: Uuid,
        started: Instant,
        change: &TriggeredChange,
        integration: &BranchReference,
        reason: String,
        workspace_ready: bool,
    ) -> IntegrationReport {
        let workspace = WorkspaceController::new(self.git.as_ref());
        let cleaned = if workspace_ready {
            if let Err(e) = self.git.reset_hard().await {
                tracing::warn!(error = %e, "reset before returning to integration branch failed");
            }
            workspace.checkout_integration(integration).await
        } else {
            workspace.prepare(integration).await
        };
        if let Err(e) = cleaned {
            tracing::warn!(branch = %integration, error = %e, "could not check out integration branch");
        }
        let outcome = Outcome::NothingToDo { reason };
        self.finish(run, run_id, started, None, change, outcome, Stage::NotBuilt)
    }

    /// Best-effort restore onto the triggered branch. A failure here is
    /// logged and counted but never changes the run's outcome.
    async fn roll_back(&self, run: &mut dyn BuildRun, run_id: &str, ctx: &IntegrationContext) {
        let reference = ctx.triggered_branch.qualified();
        let workspace = WorkspaceController::new(self.git.as_ref());
        match workspace.restore(&reference).await {
            Ok(()) => run.console(&messages::prefixed(format!(
                "Rolled back workspace to {reference}"
            ))),
            Err(e) => {
                METRICS.inc_rollbacks_failed();
                obs::emit_rollback_failed(run_id, &e);
                run.console(&messages::prefixed(format!(
                    "Rollback to {reference} failed: {}",
                    e.message()
                )));
            }
        }
    }

    /// Finalize the outcome, then report it: result, console, counters and
    /// the audit record, in that order.
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        run: &mut dyn BuildRun,
        run_id: Uuid,
        started: Instant,
        ctx: Option<&IntegrationContext>,
        change: &TriggeredChange,
        outcome: Outcome,
        stage: Stage,
    ) -> IntegrationReport {
        let id = run_id.to_string();
        let resulting_revision = match &outcome {
            Outcome::Integrated { final_revision } => final_revision.clone(),
            _ => change.revision.clone(),
        };
        run.set_result(build_result_for(&outcome));

        match &outcome {
            Outcome::Integrated { .. } => METRICS.inc_integrated(),
            Outcome::NothingToDo { reason } => {
                METRICS.inc_skipped();
                run.console(&messages::prefixed(reason));
            }
            Outcome::Failed { kind, message } => {
                METRICS.inc_failed();
                tracing::error!(kind = %kind, message = %message, "integration failed");
                run.console(&messages::prefixed(format!("{kind}: {message}")));
            }
        }

        if let (Some(ctx), false) = (ctx, matches!(outcome, Outcome::NothingToDo { .. })) {
            let _span = obs::IntegrationSpan::enter(&id, &ctx.triggered_branch.qualified());
            let record = AuditRecord::new(run_id, ctx, change.revision.clone(), &outcome);
            if let Some(log) = &self.audit_log {
                if let Err(e) = log.append(&record) {
                    tracing::warn!(path = %log.path().display(), error = %e, "audit log append failed");
                }
            }
            run.attach_audit_record(record);
        }

        obs::emit_run_finished(&id, outcome.label(), stage, started.elapsed().as_millis() as u64);
        METRICS.flush();
        IntegrationReport {
            run_id,
            outcome,
            resulting_revision,
            stage,
        }
    }

    fn configured_integration_branch(&self, run: &dyn BuildRun) -> BranchReference {
        BranchReference::new(
            self.config.repository_name.trim(),
            self.config.integration_branch.trim(),
        )
        .expand(run.environment())
    }

    /// Best available context for a run rejected during evaluation.
    fn fallback_context(&self, run: &dyn BuildRun, change: &TriggeredChange) -> IntegrationContext {
        let integration = self.configured_integration_branch(run);
        let triggered = change
            .select_branch(&integration.remote_name)
            .map(|b| BranchReference::parse_qualified(&run.environment().expand(b)))
            .unwrap_or_else(|| BranchReference::new("", ""));
        let credentials_id = self.config.credentials_for(&integration.remote_name);
        IntegrationContext::new(triggered, integration, credentials_id)
    }
}

fn failed(err: &PreintError) -> Outcome {
    Outcome::Failed {
        kind: err.failure_kind().unwrap_or(FailureKind::Unexpected),
        message: err.message(),
    }
}
