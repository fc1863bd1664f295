//! Eligibility evaluation: should this triggered change be integrated at all?
//!
//! A pure classifier over already-fetched metadata. It never touches the
//! workspace or the remote.

use crate::domain::branch::BranchReference;
use crate::domain::change::TriggeredChange;
use crate::domain::error::{PreintError, Result};
use crate::env::Environment;
use crate::messages;

/// Branch pair resolved by a successful evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub triggered_branch: BranchReference,
    pub integration_branch: BranchReference,
}

impl Eligibility {
    pub fn repository_name(&self) -> &str {
        &self.integration_branch.remote_name
    }
}

/// Evaluates triggered changes against a configured integration target.
#[derive(Debug, Clone)]
pub struct EligibilityEvaluator<'a> {
    remote_names: &'a [String],
    env: &'a Environment,
}

impl<'a> EligibilityEvaluator<'a> {
    /// `remote_names` are the effective names of the configured remotes.
    pub fn new(remote_names: &'a [String], env: &'a Environment) -> Self {
        Self { remote_names, env }
    }

    /// Classify `change` against `integration_branch` in `repository_name`.
    ///
    /// Both names are templates and are expanded here. Fails with
    /// [`PreintError::UnsupportedConfiguration`] when the configuration is
    /// structurally invalid and with [`PreintError::NothingToDo`] when the
    /// change is unrelated to the integration repository.
    pub fn evaluate(
        &self,
        change: &TriggeredChange,
        integration_branch: &str,
        repository_name: &str,
    ) -> Result<Eligibility> {
        let branch = self.env.expand(integration_branch).trim().to_string();
        let repo = self.env.expand(repository_name).trim().to_string();

        if branch.is_empty() {
            return Err(PreintError::UnsupportedConfiguration(format!(
                "integration branch '{integration_branch}' resolves to an empty name"
            )));
        }
        if repo.is_empty() {
            return Err(PreintError::UnsupportedConfiguration(format!(
                "integration repository '{repository_name}' resolves to an empty name"
            )));
        }
        if !self.remote_names.iter().any(|r| *r == repo) {
            return Err(PreintError::UnsupportedConfiguration(format!(
                "integration repository '{repo}' does not match any configured remote ({})",
                self.remote_names.join(", ")
            )));
        }

        let integration = BranchReference::new(repo.clone(), branch);

        let Some(selected) = change.select_branch(&repo) else {
            return Err(PreintError::NothingToDo("No revision to build".to_string()));
        };
        let triggered = BranchReference::parse_qualified(&self.env.expand(selected));

        if triggered == integration || triggered.qualified() == integration.branch_name {
            return Err(PreintError::UnsupportedConfiguration(format!(
                "Using the integration branch {} for polling and development is not permitted. \
                 Build a development branch and integrate it into {}.",
                triggered.qualified(),
                integration.branch_name
            )));
        }

        if triggered.remote_name != repo || triggered.branch_name.is_empty() {
            return Err(PreintError::NothingToDo(messages::no_relevant_change(
                &triggered.qualified(),
            )));
        }

        Ok(Eligibility {
            triggered_branch: triggered,
            integration_branch: integration,
        })
    }
}
