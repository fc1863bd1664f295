//! Workspace controller: prepares the local integration workspace and rolls
//! it back on failure paths.

use crate::domain::branch::BranchReference;
use crate::domain::change::Revision;
use crate::domain::error::{PreintError, Result};
use crate::git::{CheckoutRequest, GitClient};

/// Prepares and restores one local workspace through a [`GitClient`].
pub struct WorkspaceController<'a> {
    git: &'a dyn GitClient,
}

impl<'a> WorkspaceController<'a> {
    pub fn new(git: &'a dyn GitClient) -> Self {
        Self { git }
    }

    /// Check out the remote's current tip of `integration` onto a fresh local
    /// branch of the same name, and return that tip.
    ///
    /// Any stale local branch is replaced, so two consecutive calls with no
    /// remote change in between yield the same revision.
    pub async fn prepare(&self, integration: &BranchReference) -> Result<Revision> {
        self.git
            .fetch(&integration.remote_name)
            .await
            .map_err(|e| workspace_error("fetching", &integration.remote_name, e))?;
        self.checkout_integration(integration).await
    }

    /// Forced checkout of the integration branch from the last fetched remote
    /// state, without fetching again.
    pub async fn checkout_integration(&self, integration: &BranchReference) -> Result<Revision> {
        let request = CheckoutRequest::branch(&integration.branch_name, integration.qualified());
        self.git
            .checkout(&request)
            .await
            .map_err(|e| workspace_error("checking out", &integration.qualified(), e))?;
        self.git
            .head()
            .await
            .map_err(|e| workspace_error("resolving head of", &integration.qualified(), e))
    }

    /// Roll the workspace back onto `reference` (normally the triggered
    /// branch), discarding any half-applied merge.
    pub async fn restore(&self, reference: &str) -> Result<()> {
        if let Err(e) = self.git.reset_hard().await {
            tracing::warn!(reference, error = %e, "reset before restore failed");
        }
        self.git
            .checkout(&CheckoutRequest::reference(reference))
            .await
            .map_err(|e| workspace_error("restoring", reference, e))
    }
}

fn workspace_error(action: &str, target: &str, err: impl std::fmt::Display) -> PreintError {
    PreintError::EstablishingWorkspaceFailed(format!("{action} {target}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryRemote;

    fn master() -> BranchReference {
        BranchReference::new("origin", "master")
    }

    #[tokio::test]
    async fn prepare_checks_out_remote_tip() {
        let remote = MemoryRemote::new("origin");
        let r0 = remote.init_branch("master", &[("README", "hi")]);
        let git = remote.workspace();
        let ws = WorkspaceController::new(&git);

        assert_eq!(ws.prepare(&master()).await.unwrap(), r0);
        assert_eq!(git.current_branch().as_deref(), Some("master"));
        assert_eq!(
            git.operations(),
            vec!["fetch origin", "checkout -B master origin/master"]
        );
    }

    #[tokio::test]
    async fn prepare_is_idempotent() {
        let remote = MemoryRemote::new("origin");
        remote.init_branch("master", &[("README", "hi")]);
        let git = remote.workspace();
        let ws = WorkspaceController::new(&git);

        let first = ws.prepare(&master()).await.unwrap();
        let second = ws.prepare(&master()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn prepare_picks_up_remote_advance() {
        let remote = MemoryRemote::new("origin");
        remote.init_branch("master", &[("README", "hi")]);
        let git = remote.workspace();
        let ws = WorkspaceController::new(&git);

        ws.prepare(&master()).await.unwrap();
        let r1 = remote.commit_on("master", &[("b.txt", "b")], "advance");
        assert_eq!(ws.prepare(&master()).await.unwrap(), r1);
    }

    #[tokio::test]
    async fn fetch_failure_is_establishing_workspace() {
        let remote = MemoryRemote::new("origin");
        remote.init_branch("master", &[]);
        let git = remote.workspace().fail_fetch();
        let err = WorkspaceController::new(&git)
            .prepare(&master())
            .await
            .unwrap_err();
        assert!(matches!(err, PreintError::EstablishingWorkspaceFailed(_)));
    }

    #[tokio::test]
    async fn missing_integration_branch_fails() {
        let remote = MemoryRemote::new("origin");
        remote.init_branch("master", &[]);
        let git = remote.workspace();
        let err = WorkspaceController::new(&git)
            .prepare(&BranchReference::new("origin", "release"))
            .await
            .unwrap_err();
        assert!(err.message().contains("origin/release"));
    }

    #[tokio::test]
    async fn restore_discards_staged_merge_and_detaches() {
        let remote = MemoryRemote::new("origin");
        let r0 = remote.init_branch("master", &[("a.txt", "a")]);
        remote.create_branch("feature/x", &r0);
        let tip = remote.commit_on("feature/x", &[("b.txt", "b")], "add b");
        let git = remote.workspace();
        let ws = WorkspaceController::new(&git);
        ws.prepare(&master()).await.unwrap();

        git.merge(&crate::git::MergeRequest {
            revision: tip.clone(),
            mode: crate::git::MergeMode::Squash,
        })
        .await
        .unwrap();
        assert!(git.has_staged_changes());

        ws.restore("origin/feature/x").await.unwrap();
        assert!(!git.has_staged_changes());
        assert_eq!(git.current_branch(), None);
        assert_eq!(git.head().await.unwrap(), tip);
    }
}
