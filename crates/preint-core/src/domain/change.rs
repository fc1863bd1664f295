//! The change that triggered a run, and revision identifiers.

use serde::{Deserialize, Serialize};

/// A content identifier for a commit (a git object id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The change that caused the current run. Owned by the host; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredChange {
    /// Remote-qualified branch names pointing at `revision` (e.g. `origin/feature/x`).
    pub branches: Vec<String>,
    /// Tip of the change.
    pub revision: Revision,
}

impl TriggeredChange {
    pub fn new(branch: impl Into<String>, revision: impl Into<Revision>) -> Self {
        Self {
            branches: vec![branch.into()],
            revision: revision.into(),
        }
    }

    pub fn with_branches(branches: Vec<String>, revision: impl Into<Revision>) -> Self {
        Self {
            branches,
            revision: revision.into(),
        }
    }

    /// The branch this run integrates: the first one under `repository_name/`,
    /// falling back to the first branch listed.
    pub fn select_branch(&self, repository_name: &str) -> Option<&str> {
        let prefix = format!("{repository_name}/");
        self.branches
            .iter()
            .find(|b| b.starts_with(&prefix))
            .or_else(|| self.branches.first())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_revision_truncates() {
        let r = Revision::new("0123456789abcdef");
        assert_eq!(r.short(), "01234567");
        assert_eq!(Revision::new("abc").short(), "abc");
    }

    #[test]
    fn select_branch_prefers_repository_match() {
        let change = TriggeredChange::with_branches(
            vec!["fork/feature/x".to_string(), "origin/feature/x".to_string()],
            "abc",
        );
        assert_eq!(change.select_branch("origin"), Some("origin/feature/x"));
    }

    #[test]
    fn select_branch_falls_back_to_first() {
        let change = TriggeredChange::with_branches(
            vec!["fork/a".to_string(), "fork/b".to_string()],
            "abc",
        );
        assert_eq!(change.select_branch("origin"), Some("fork/a"));
    }

    #[test]
    fn select_branch_none_when_empty() {
        let change = TriggeredChange::with_branches(vec![], "abc");
        assert_eq!(change.select_branch("origin"), None);
    }
}
