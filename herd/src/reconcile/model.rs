//! Data flowing through one reconciliation cycle

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use herdstore::Health;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::disjoint::Overlap;
use super::error::ErrorKind;

/// Local main relative to its remote-tracking branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainFacts {
    pub local_ahead: u32,
    pub local_behind: u32,
    pub local_tip: String,
    pub remote_tip: String,
}

/// One tracked branch as seen on the remote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFacts {
    /// Name without the `<remote>/` prefix
    pub name: String,
    pub enabled: bool,
    pub tip: String,
    pub ahead: u32,
    pub behind: u32,
    /// Paths the branch changed since its merge-base with main
    pub changed_paths: BTreeSet<String>,
    /// Paths main changed since the same merge-base; filled only when diverged
    pub main_changed_paths: BTreeSet<String>,
}

impl BranchFacts {
    pub fn is_diverged(&self) -> bool {
        self.ahead > 0 && self.behind > 0
    }

    pub fn is_behind_only(&self) -> bool {
        self.behind > 0 && self.ahead == 0
    }
}

/// Everything one probe learned about a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub repo: PathBuf,
    pub main: MainFacts,
    /// Every tracked branch, enabled or not, sorted by name
    pub branches: Vec<BranchFacts>,
}

impl ProbeReport {
    pub fn enabled_branches(&self) -> impl Iterator<Item = &BranchFacts> {
        self.branches.iter().filter(|b| b.enabled)
    }
}

/// Aggregate state of a repository's enabled branches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    Idle,
    MainAhead { commits: u32 },
    BranchesBehind { branches: Vec<String> },
    SingleAheadClean { branch: String },
    SingleDivergedDisjoint { branch: String },
    SingleDivergedConflict { branch: String, paths: Vec<String> },
    MultiDisjoint { branches: Vec<String> },
    MultiConflict { branches: Vec<String>, overlaps: Vec<Overlap> },
    Error,
}

impl Classification {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::SingleDivergedConflict { .. } | Self::MultiConflict { .. })
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::MainAhead { commits } => write!(f, "main ahead by {}", commits),
            Self::BranchesBehind { branches } => write!(f, "behind main: {}", branches.join(", ")),
            Self::SingleAheadClean { branch } => write!(f, "{} ahead of main", branch),
            Self::SingleDivergedDisjoint { branch } => write!(f, "{} diverged, disjoint from main", branch),
            Self::SingleDivergedConflict { branch, paths } => {
                write!(f, "{} diverged, overlaps main on {}", branch, paths.join(", "))
            }
            Self::MultiDisjoint { branches } => write!(f, "disjoint: {}", branches.join(", ")),
            Self::MultiConflict { overlaps, .. } => {
                let pairs: Vec<String> = overlaps.iter().map(|o| o.to_string()).collect();
                write!(f, "conflict: {}", pairs.join("; "))
            }
            Self::Error => write!(f, "error"),
        }
    }
}

/// What to do about a classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    None,
    PushMain,
    SyncBehind { branches: Vec<String> },
    FastForwardPush { branch: String },
    MergeCandidate { branches: Vec<String> },
    Stop { reason: String },
    Error,
}

impl Action {
    /// Whether the cycle may execute this without a human asking for it
    pub fn is_automatic(&self) -> bool {
        matches!(
            self,
            Self::None | Self::PushMain | Self::SyncBehind { .. } | Self::FastForwardPush { .. }
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::PushMain => write!(f, "push main"),
            Self::SyncBehind { branches } => write!(f, "sync {}", branches.join(", ")),
            Self::FastForwardPush { branch } => write!(f, "fast-forward main to {}", branch),
            Self::MergeCandidate { branches } => write!(f, "merge candidate: {}", branches.join(", ")),
            Self::Stop { reason } => write!(f, "stop: {}", reason),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    NoOp,
    AwaitingConfirmation,
    Stopped,
    Failed { kind: ErrorKind },
}

/// Outcome of acting on an action, with a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub message: String,
}

impl ActionResult {
    pub fn applied(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Applied,
            message: message.into(),
        }
    }

    pub fn no_op(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::NoOp,
            message: message.into(),
        }
    }

    pub fn awaiting(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::AwaitingConfirmation,
            message: message.into(),
        }
    }

    pub fn stopped(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Stopped,
            message: message.into(),
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed { kind },
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Timer,
    Manual,
    MergeConfirmed,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timer => write!(f, "timer"),
            Self::Manual => write!(f, "manual"),
            Self::MergeConfirmed => write!(f, "merge-confirmed"),
        }
    }
}

/// Everything a finished cycle reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub repo: PathBuf,
    pub trigger: Trigger,
    pub state: super::cycle::CycleState,
    pub classification: Classification,
    pub action: Action,
    pub result: ActionResult,
    pub health: Health,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
