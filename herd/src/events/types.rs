//! Event types for GitHerd activity streaming
//!
//! These events describe everything observable about reconciliation:
//! - Cycle lifecycle (start, classification, chosen action, result, finish)
//! - Repository health transitions
//! - Branch changes made from the command line

use chrono::{DateTime, Utc};
use herdstore::Health;
use serde::{Deserialize, Serialize};

use crate::reconcile::{Action, ActionResult, Classification, CycleReport, Trigger};

/// Core event enum - the vocabulary of GitHerd activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HerdEvent {
    // === Cycle Lifecycle ===
    /// A reconciliation cycle has started
    CycleStarted {
        repo: String,
        cycle_id: String,
        trigger: Trigger,
    },
    /// The repository has been classified
    Classified {
        repo: String,
        cycle_id: String,
        classification: Classification,
    },
    /// An action has been selected
    ActionChosen {
        repo: String,
        cycle_id: String,
        action: Action,
    },
    /// The action has been executed, offered or refused
    ActionCompleted {
        repo: String,
        cycle_id: String,
        result: ActionResult,
    },
    /// Repository health differs from what was stored
    HealthChanged {
        repo: String,
        cycle_id: String,
        previous: Option<Health>,
        current: Health,
    },
    /// The cycle is over; carries the full report
    CycleFinished {
        repo: String,
        cycle_id: String,
        report: Box<CycleReport>,
    },

    // === Branch Management ===
    /// A branch's sync participation was changed
    BranchToggled { repo: String, branch: String, enabled: bool },
    /// A tracked branch was deleted on the remote
    BranchDeleted { repo: String, branch: String },
}

impl HerdEvent {
    /// Repository this event belongs to
    pub fn repo(&self) -> &str {
        match self {
            HerdEvent::CycleStarted { repo, .. }
            | HerdEvent::Classified { repo, .. }
            | HerdEvent::ActionChosen { repo, .. }
            | HerdEvent::ActionCompleted { repo, .. }
            | HerdEvent::HealthChanged { repo, .. }
            | HerdEvent::CycleFinished { repo, .. }
            | HerdEvent::BranchToggled { repo, .. }
            | HerdEvent::BranchDeleted { repo, .. } => repo,
        }
    }

    /// Cycle this event belongs to, if it came from a cycle
    pub fn cycle_id(&self) -> Option<&str> {
        match self {
            HerdEvent::CycleStarted { cycle_id, .. }
            | HerdEvent::Classified { cycle_id, .. }
            | HerdEvent::ActionChosen { cycle_id, .. }
            | HerdEvent::ActionCompleted { cycle_id, .. }
            | HerdEvent::HealthChanged { cycle_id, .. }
            | HerdEvent::CycleFinished { cycle_id, .. } => Some(cycle_id),
            HerdEvent::BranchToggled { .. } | HerdEvent::BranchDeleted { .. } => None,
        }
    }

    /// Get the event type as a string (for logging/filtering)
    pub fn event_type(&self) -> &'static str {
        match self {
            HerdEvent::CycleStarted { .. } => "CycleStarted",
            HerdEvent::Classified { .. } => "Classified",
            HerdEvent::ActionChosen { .. } => "ActionChosen",
            HerdEvent::ActionCompleted { .. } => "ActionCompleted",
            HerdEvent::HealthChanged { .. } => "HealthChanged",
            HerdEvent::CycleFinished { .. } => "CycleFinished",
            HerdEvent::BranchToggled { .. } => "BranchToggled",
            HerdEvent::BranchDeleted { .. } => "BranchDeleted",
        }
    }

    /// One-line human summary, used by `githerd logs`
    pub fn summary(&self) -> String {
        match self {
            HerdEvent::CycleStarted { trigger, .. } => format!("cycle started ({})", trigger),
            HerdEvent::Classified { classification, .. } => format!("classified: {}", classification),
            HerdEvent::ActionChosen { action, .. } => format!("action: {}", action),
            HerdEvent::ActionCompleted { result, .. } => format!("result: {}", result.message),
            HerdEvent::HealthChanged { previous, current, .. } => match previous {
                Some(previous) => format!("health {} -> {}", previous, current),
                None => format!("health {}", current),
            },
            HerdEvent::CycleFinished { report, .. } => format!("cycle finished ({})", report.state),
            HerdEvent::BranchToggled { branch, enabled, .. } => {
                format!("{} {}", branch, if *enabled { "enabled" } else { "disabled" })
            }
            HerdEvent::BranchDeleted { branch, .. } => format!("{} deleted", branch),
        }
    }
}

/// Wrapper for events written to JSONL files
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: HerdEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: HerdEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
