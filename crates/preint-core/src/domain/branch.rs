//! Branch references: a branch name within a named remote repository.

use serde::{Deserialize, Serialize};

use crate::env::Environment;

/// A branch within a named remote, e.g. `origin` / `feature/x`.
///
/// Both fields may hold `${NAME}` placeholders until [`BranchReference::expand`]
/// is called. Equality is byte-for-byte on both fields; no normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchReference {
    pub remote_name: String,
    pub branch_name: String,
}

impl BranchReference {
    pub fn new(remote_name: impl Into<String>, branch_name: impl Into<String>) -> Self {
        Self {
            remote_name: remote_name.into(),
            branch_name: branch_name.into(),
        }
    }

    /// Split a remote-qualified name (`origin/feature/x`) at the first `/`.
    ///
    /// Names without a `/` carry an empty remote.
    pub fn parse_qualified(name: &str) -> Self {
        match name.split_once('/') {
            Some((remote, branch)) => Self::new(remote, branch),
            None => Self::new("", name),
        }
    }

    /// Resolve placeholders in both fields.
    pub fn expand(&self, env: &Environment) -> Self {
        Self {
            remote_name: env.expand(&self.remote_name),
            branch_name: env.expand(&self.branch_name),
        }
    }

    /// `remote/branch`, or just `branch` when no remote is set.
    pub fn qualified(&self) -> String {
        if self.remote_name.is_empty() {
            self.branch_name.clone()
        } else {
            format!("{}/{}", self.remote_name, self.branch_name)
        }
    }

    /// Fully qualified remote ref, `refs/heads/<branch>`.
    pub fn remote_ref(&self) -> String {
        format!("refs/heads/{}", self.branch_name)
    }
}

impl std::fmt::Display for BranchReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified())
    }
}
