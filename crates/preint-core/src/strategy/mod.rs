//! Integration strategies: how a triggered branch is folded into the
//! integration branch.
//!
//! Every strategy works on the workspace already prepared by the
//! [`WorkspaceController`](crate::workspace::WorkspaceController) and must
//! either leave the remote integration branch advanced to the returned
//! revision or fail. It never checks out the integration branch itself and
//! never rolls back; that is the orchestrator's job.
//!
//! Provides:
//! - [`squash::SquashStrategy`]: one new commit with the branch's combined changes
//! - [`accumulated::AccumulatedStrategy`]: a merge commit listing the integrated commits
//! - [`registry::StrategyRegistry`]: name to factory table

pub mod accumulated;
pub mod registry;
pub mod squash;

use async_trait::async_trait;

use crate::domain::change::{Revision, TriggeredChange};
use crate::domain::context::IntegrationContext;
use crate::domain::error::{PreintError, Result};
use crate::git::{CommitSummary, GitClient, GitError, PushRequest};
use crate::messages;

pub use accumulated::AccumulatedStrategy;
pub use registry::{StrategyFactory, StrategyRegistry};
pub use squash::SquashStrategy;

/// Capability every integration strategy provides.
#[async_trait]
pub trait IntegrationStrategy: Send + Sync {
    /// Registry name, e.g. `squash`.
    fn name(&self) -> &str;

    /// Fold `change` into the checked-out integration branch and push it.
    ///
    /// Returns the new integration tip. Fails with
    /// [`PreintError::IntegrationFailed`] on conflicts or a lost push race,
    /// and with [`PreintError::NothingToDo`] when there is nothing to add.
    async fn integrate(
        &self,
        git: &dyn GitClient,
        change: &TriggeredChange,
        ctx: &IntegrationContext,
    ) -> Result<Revision>;
}

/// Integration tip the workspace was prepared from.
pub(crate) async fn integration_base(
    git: &dyn GitClient,
    ctx: &IntegrationContext,
) -> Result<Revision> {
    match &ctx.integration_base {
        Some(base) => Ok(base.clone()),
        None => Ok(git.head().await?),
    }
}

/// Commits the triggered change adds on top of `base`; empty means there is
/// nothing left to integrate.
pub(crate) async fn pending_commits(
    git: &dyn GitClient,
    base: &Revision,
    change: &TriggeredChange,
    ctx: &IntegrationContext,
) -> Result<Vec<CommitSummary>> {
    let commits = git.commits_between(base, &change.revision).await?;
    if commits.is_empty() {
        return Err(PreintError::NothingToDo(messages::no_relevant_change(
            &ctx.triggered_branch.qualified(),
        )));
    }
    Ok(commits)
}

/// Conditionally advance the remote integration branch from `base` to `new_tip`.
pub(crate) async fn push_conditionally(
    git: &dyn GitClient,
    ctx: &IntegrationContext,
    base: &Revision,
    new_tip: &Revision,
) -> Result<()> {
    let request = PushRequest {
        remote: ctx.integration_branch.remote_name.clone(),
        branch: ctx.integration_branch.branch_name.clone(),
        expected_tip: base.clone(),
        new_tip: new_tip.clone(),
    };
    git.push(&request).await.map_err(|e| match e {
        GitError::PushRejected { .. } => PreintError::IntegrationFailed(format!(
            "{} advanced concurrently; {e}",
            ctx.integration_branch.qualified()
        )),
        other => PreintError::IntegrationFailed(format!(
            "pushing {} to {}: {other}",
            new_tip.short(),
            ctx.integration_branch.qualified()
        )),
    })
}

/// Map a merge failure onto `IntegrationFailed`.
pub(crate) fn merge_failed(ctx: &IntegrationContext, err: GitError) -> PreintError {
    PreintError::IntegrationFailed(format!(
        "merging {} into {}: {err}",
        ctx.triggered_branch.qualified(),
        ctx.integration_branch.branch_name
    ))
}
