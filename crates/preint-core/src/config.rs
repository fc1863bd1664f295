//! Integration configuration: target branch, repository, strategy, remotes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::{PreintError, Result};

/// Remote name assumed when a remote is configured without one.
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_INTEGRATION_BRANCH: &str = "master";
pub const DEFAULT_STRATEGY: &str = "squash";

fn default_integration_branch() -> String {
    DEFAULT_INTEGRATION_BRANCH.to_string()
}

fn default_repository_name() -> String {
    DEFAULT_REMOTE.to_string()
}

fn default_strategy_name() -> String {
    DEFAULT_STRATEGY.to_string()
}

/// A configured remote repository and its stored credential binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub credentials_id: Option<String>,
}

impl RemoteConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials_id: impl Into<String>) -> Self {
        self.credentials_id = Some(credentials_id.into());
        self
    }

    /// Effective remote name; blank means [`DEFAULT_REMOTE`].
    pub fn effective_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_REMOTE,
        }
    }
}

/// Which strategy to build from the registry, plus its options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_strategy_name")]
    pub name: String,
    /// Fixed commit message overriding the strategy's own.
    #[serde(default)]
    pub commit_message: Option<String>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: default_strategy_name(),
            commit_message: None,
        }
    }
}

impl StrategyConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commit_message: None,
        }
    }
}

/// Configuration of one integration job.
///
/// `integration_branch` and `repository_name` may contain `${NAME}`
/// placeholders, resolved per run against the run's environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default = "default_integration_branch")]
    pub integration_branch: String,
    #[serde(default = "default_repository_name")]
    pub repository_name: String,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            integration_branch: default_integration_branch(),
            repository_name: default_repository_name(),
            strategy: StrategyConfig::default(),
            remotes: Vec::new(),
        }
    }
}

impl IntegrationConfig {
    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PreintError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PreintError::Config(format!("invalid config: {e}")))
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remotes.push(remote);
        self
    }

    /// Credentials id of the first remote named `repository_name` that has one.
    pub fn credentials_for(&self, repository_name: &str) -> Option<String> {
        self.remotes
            .iter()
            .filter(|r| r.effective_name() == repository_name)
            .find_map(|r| r.credentials_id.clone())
    }

    pub fn remote_names(&self) -> Vec<String> {
        self.remotes
            .iter()
            .map(|r| r.effective_name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_json() {
        let cfg = IntegrationConfig::from_json("{}").unwrap();
        assert_eq!(cfg.integration_branch, "master");
        assert_eq!(cfg.repository_name, "origin");
        assert_eq!(cfg.strategy.name, "squash");
        assert!(cfg.remotes.is_empty());
    }

    #[test]
    fn full_json_round_trips_fields() {
        let cfg = IntegrationConfig::from_json(
            r#"{
                "integration_branch": "${TARGET}",
                "repository_name": "upstream",
                "strategy": {"name": "accumulated", "commit_message": "ship it"},
                "remotes": [{"name": "upstream", "url": "git@example.com:a/b.git", "credentials_id": "deploy-key"}]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.integration_branch, "${TARGET}");
        assert_eq!(cfg.strategy.name, "accumulated");
        assert_eq!(cfg.strategy.commit_message.as_deref(), Some("ship it"));
        assert_eq!(cfg.credentials_for("upstream").as_deref(), Some("deploy-key"));
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = IntegrationConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, PreintError::Config(_)));
    }

    #[test]
    fn blank_remote_name_means_origin() {
        let cfg = IntegrationConfig::default().with_remote(RemoteConfig {
            name: Some("  ".to_string()),
            url: None,
            credentials_id: Some("cred".to_string()),
        });
        assert_eq!(cfg.remote_names(), vec!["origin".to_string()]);
        assert_eq!(cfg.credentials_for("origin").as_deref(), Some("cred"));
    }

    #[test]
    fn first_matching_credentials_win() {
        let cfg = IntegrationConfig::default()
            .with_remote(RemoteConfig::named("origin"))
            .with_remote(RemoteConfig::named("origin").with_credentials("first"))
            .with_remote(RemoteConfig::named("origin").with_credentials("second"));
        assert_eq!(cfg.credentials_for("origin").as_deref(), Some("first"));
    }

    #[test]
    fn missing_credentials_are_tolerated() {
        let cfg = IntegrationConfig::default().with_remote(RemoteConfig::named("origin"));
        assert_eq!(cfg.credentials_for("origin"), None);
        assert_eq!(cfg.credentials_for("fork"), None);
    }
}
