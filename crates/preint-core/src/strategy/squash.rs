//! Squash strategy: every commit of the triggered branch becomes one commit
//! on top of the integration tip.

use async_trait::async_trait;

use crate::domain::change::{Revision, TriggeredChange};
use crate::domain::context::IntegrationContext;
use crate::domain::error::{PreintError, Result};
use crate::git::{CommitRequest, GitClient, GitError, MergeMode, MergeRequest};
use crate::strategy::{
    integration_base, merge_failed, pending_commits, push_conditionally, IntegrationStrategy,
};

pub const NAME: &str = "squash";

#[derive(Debug, Clone, Default)]
pub struct SquashStrategy {
    commit_message: Option<String>,
}

impl SquashStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed message instead of the branch's latest commit message.
    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    fn message_for(&self, latest_message: &str, ctx: &IntegrationContext) -> String {
        if let Some(fixed) = self
            .commit_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
        {
            return fixed.to_string();
        }
        if !latest_message.trim().is_empty() {
            return latest_message.trim_end().to_string();
        }
        format!(
            "Squashed commit of branch '{}'",
            ctx.triggered_branch.qualified()
        )
    }
}

#[async_trait]
impl IntegrationStrategy for SquashStrategy {
    fn name(&self) -> &str {
        NAME
    }

    async fn integrate(
        &self,
        git: &dyn GitClient,
        change: &TriggeredChange,
        ctx: &IntegrationContext,
    ) -> Result<Revision> {
        let base = integration_base(git, ctx).await?;
        let commits = pending_commits(git, &base, change, ctx).await?;
        tracing::info!(
            branch = %ctx.triggered_branch,
            commits = commits.len(),
            onto = %base.short(),
            "squashing"
        );

        // Newest first, so the head of the list is the branch tip.
        let latest = match commits.first() {
            Some(tip) if tip.revision == change.revision => tip.clone(),
            _ => git.commit_info(&change.revision).await?,
        };

        git.merge(&MergeRequest {
            revision: change.revision.clone(),
            mode: MergeMode::Squash,
        })
        .await
        .map_err(|e| merge_failed(ctx, e))?;

        let new_tip = git
            .commit(&CommitRequest {
                message: self.message_for(&latest.message, ctx),
                author: Some(latest.author.clone()),
            })
            .await
            .map_err(|e| match e {
                GitError::NothingToCommit => PreintError::IntegrationFailed(format!(
                    "squashing {} produced no changes on {}",
                    ctx.triggered_branch.qualified(),
                    ctx.integration_branch.branch_name
                )),
                other => merge_failed(ctx, other),
            })?;

        push_conditionally(git, ctx, &base, &new_tip).await?;
        Ok(new_tip)
    }
}
