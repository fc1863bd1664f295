//! Domain-level error taxonomy for pretested integration.

use serde::{Deserialize, Serialize};

use crate::git::GitError;

/// Failure classes a finished run can be reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Branch or repository configuration is structurally invalid.
    UnsupportedConfiguration,
    /// The integration workspace could not be prepared or restored.
    EstablishingWorkspace,
    /// Content-level failure: merge conflict or a lost push race.
    IntegrationFailed,
    /// Lower-level I/O, git or interruption error.
    Unexpected,
}

impl FailureKind {
    /// Label used in console lines and audit records.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedConfiguration => "UnsupportedConfiguration",
            FailureKind::EstablishingWorkspace => "EstablishingWorkspaceFailed",
            FailureKind::IntegrationFailed => "IntegrationFailed",
            FailureKind::Unexpected => "UnexpectedError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Pretested integration domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PreintError {
    #[error("nothing to do: {0}")]
    NothingToDo(String),

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("establishing workspace failed: {0}")]
    EstablishingWorkspaceFailed(String),

    #[error("integration failed: {0}")]
    IntegrationFailed(String),

    #[error("unknown integration strategy: {0}")]
    UnknownStrategy(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreintError {
    /// Whether this error means "not built" rather than a failure.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, PreintError::NothingToDo(_))
    }

    /// Map onto the failure taxonomy. `NothingToDo` is not a failure and
    /// returns `None`.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            PreintError::NothingToDo(_) => None,
            PreintError::UnsupportedConfiguration(_)
            | PreintError::UnknownStrategy(_)
            | PreintError::Config(_) => Some(FailureKind::UnsupportedConfiguration),
            PreintError::EstablishingWorkspaceFailed(_) => Some(FailureKind::EstablishingWorkspace),
            PreintError::IntegrationFailed(_) => Some(FailureKind::IntegrationFailed),
            PreintError::Git(GitError::MergeConflict { .. })
            | PreintError::Git(GitError::PushRejected { .. }) => {
                Some(FailureKind::IntegrationFailed)
            }
            PreintError::Git(_) | PreintError::Serialization(_) | PreintError::Io(_) => {
                Some(FailureKind::Unexpected)
            }
        }
    }

    /// The bare message, without the variant prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            PreintError::NothingToDo(msg)
            | PreintError::UnsupportedConfiguration(msg)
            | PreintError::EstablishingWorkspaceFailed(msg)
            | PreintError::IntegrationFailed(msg)
            | PreintError::Config(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for pretested integration operations.
pub type Result<T> = std::result::Result<T, PreintError>;
