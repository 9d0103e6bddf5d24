//! Divergence classifier

use super::disjoint;
use super::model::{BranchFacts, Classification, MainFacts};

/// Name given to main's own changes when checking a diverged branch against them
const MAIN_LABEL: &str = "main";

/// Classify a repository from its main facts and tracked branches
///
/// Disabled branches are ignored entirely. The result does not depend on the
/// order of `branches`. First matching row wins:
///
/// 1. no enabled branches and local main level with the remote: `Idle`
/// 2. local main ahead of the remote: `MainAhead`
/// 3. enabled branches strictly behind main: `BranchesBehind`
/// 4. exactly one enabled branch ahead: `SingleAheadClean`, or when it is also
///    behind, `SingleDiverged*` depending on overlap with what main changed
/// 5. several enabled branches ahead: `Multi*` depending on pairwise overlap
/// 6. anything else: `Idle`
pub fn classify(main: &MainFacts, branches: &[BranchFacts]) -> Classification {
    let mut enabled: Vec<&BranchFacts> = branches.iter().filter(|b| b.enabled).collect();
    enabled.sort_by(|a, b| a.name.cmp(&b.name));

    if enabled.is_empty() && main.local_ahead == 0 && main.local_behind == 0 {
        return Classification::Idle;
    }

    if main.local_ahead > 0 {
        return Classification::MainAhead {
            commits: main.local_ahead,
        };
    }

    let behind: Vec<String> = enabled
        .iter()
        .filter(|b| b.is_behind_only())
        .map(|b| b.name.clone())
        .collect();
    if !behind.is_empty() {
        return Classification::BranchesBehind { branches: behind };
    }

    let ahead: Vec<&BranchFacts> = enabled.into_iter().filter(|b| b.ahead > 0).collect();
    match ahead.as_slice() {
        [] => Classification::Idle,
        [single] if single.behind == 0 => Classification::SingleAheadClean {
            branch: single.name.clone(),
        },
        [single] => {
            let overlap = disjoint::overlaps([
                (single.name.as_str(), &single.changed_paths),
                (MAIN_LABEL, &single.main_changed_paths),
            ]);
            match overlap.into_iter().next() {
                None => Classification::SingleDivergedDisjoint {
                    branch: single.name.clone(),
                },
                Some(overlap) => Classification::SingleDivergedConflict {
                    branch: single.name.clone(),
                    paths: overlap.paths,
                },
            }
        }
        many => {
            let names: Vec<String> = many.iter().map(|b| b.name.clone()).collect();
            let overlaps = disjoint::overlaps(many.iter().map(|b| (b.name.as_str(), &b.changed_paths)));
            if overlaps.is_empty() {
                Classification::MultiDisjoint { branches: names }
            } else {
                Classification::MultiConflict {
                    branches: names,
                    overlaps,
                }
            }
        }
    }
}
