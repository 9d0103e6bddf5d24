//! Classification to action table

use super::model::{Action, Classification};

/// Pick the action for a classification. Pure and total.
pub fn select(classification: &Classification) -> Action {
    match classification {
        Classification::Idle => Action::None,
        Classification::MainAhead { .. } => Action::PushMain,
        Classification::BranchesBehind { branches } => Action::SyncBehind {
            branches: branches.clone(),
        },
        Classification::SingleAheadClean { branch } => Action::FastForwardPush { branch: branch.clone() },
        Classification::SingleDivergedDisjoint { branch } => Action::MergeCandidate {
            branches: vec![branch.clone()],
        },
        Classification::MultiDisjoint { branches } => Action::MergeCandidate {
            branches: branches.clone(),
        },
        Classification::SingleDivergedConflict { .. } | Classification::MultiConflict { .. } => Action::Stop {
            reason: classification.to_string(),
        },
        Classification::Error => Action::Error,
    }
}
