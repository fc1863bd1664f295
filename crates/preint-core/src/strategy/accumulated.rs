//! Accumulated strategy: a non-fast-forward merge commit that keeps the
//! branch history and lists the integrated commits in its message.

use async_trait::async_trait;

use crate::domain::change::{Revision, TriggeredChange};
use crate::domain::context::IntegrationContext;
use crate::domain::error::Result;
use crate::git::{CommitSummary, GitClient, MergeMode, MergeRequest};
use crate::strategy::{
    integration_base, merge_failed, pending_commits, push_conditionally, IntegrationStrategy,
};

pub const NAME: &str = "accumulated";

#[derive(Debug, Clone, Default)]
pub struct AccumulatedStrategy {
    commit_message: Option<String>,
}

impl AccumulatedStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    fn message_for(&self, commits: &[CommitSummary], ctx: &IntegrationContext) -> String {
        if let Some(fixed) = self
            .commit_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
        {
            return fixed.to_string();
        }
        let mut message = format!(
            "Accumulated commit of the following from branch '{}':\n",
            ctx.triggered_branch.qualified()
        );
        for commit in commits {
            message.push_str(&format!("\n{} {}", commit.revision.short(), commit.subject));
        }
        message
    }
}

#[async_trait]
impl IntegrationStrategy for AccumulatedStrategy {
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
            "merging"
        );

        git.merge(&MergeRequest {
            revision: change.revision.clone(),
            mode: MergeMode::NoFastForward {
                message: self.message_for(&commits, ctx),
            },
        })
        .await
        .map_err(|e| merge_failed(ctx, e))?;

        let new_tip = git.head().await?;
        push_conditionally(git, ctx, &base, &new_tip).await?;
        Ok(new_tip)
    }
}
