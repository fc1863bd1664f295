//! Per-run integration context.

use serde::{Deserialize, Serialize};

use crate::domain::branch::BranchReference;
use crate::domain::change::Revision;

/// Everything a strategy needs to know about the current run.
///
/// Built once by the orchestrator after evaluation and dropped when the run
/// ends. `integration_base` is the integration branch tip the workspace was
/// prepared from; it is the expected value for the conditional push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationContext {
    pub triggered_branch: BranchReference,
    pub integration_branch: BranchReference,
    pub credentials_id: Option<String>,
    pub integration_base: Option<Revision>,
}

impl IntegrationContext {
    pub fn new(
        triggered_branch: BranchReference,
        integration_branch: BranchReference,
        credentials_id: Option<String>,
    ) -> Self {
        Self {
            triggered_branch,
            integration_branch,
            credentials_id,
            integration_base: None,
        }
    }

    pub fn with_base(mut self, base: Revision) -> Self {
        self.integration_base = Some(base);
        self
    }

    /// Name of the remote both branches live in.
    pub fn repository_name(&self) -> &str {
        &self.integration_branch.remote_name
    }
}
