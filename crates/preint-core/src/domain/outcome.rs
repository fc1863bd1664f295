//! Run outcomes and orchestrator stages.

use serde::{Deserialize, Serialize};

use crate::domain::change::Revision;
use crate::domain::error::FailureKind;

/// Stages of one orchestration run.
///
/// `Start → Evaluated → WorkspaceReady → StrategyApplied → Committed`, with
/// `RolledBack` and `NotBuilt` as the other terminal stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Evaluated,
    WorkspaceReady,
    StrategyApplied,
    Committed,
    RolledBack,
    NotBuilt,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Evaluated => "evaluated",
            Stage::WorkspaceReady => "workspace_ready",
            Stage::StrategyApplied => "strategy_applied",
            Stage::Committed => "committed",
            Stage::RolledBack => "rolled_back",
            Stage::NotBuilt => "not_built",
        }
    }
}

/// Result of one orchestration run. Exactly one variant per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Integrated { final_revision: Revision },
    NothingToDo { reason: String },
    Failed { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn is_integrated(&self) -> bool {
        matches!(self, Outcome::Integrated { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    /// Short label for audit records and console lines.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Integrated { .. } => "Integrated",
            Outcome::NothingToDo { .. } => "NothingToDo",
            Outcome::Failed { kind, .. } => kind.label(),
        }
    }
}
