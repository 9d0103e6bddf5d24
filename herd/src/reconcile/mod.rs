//! Branch reconciliation engine
//!
//! A cycle probes a repository, classifies its tracked branches against main,
//! selects one action and executes it when that is provably safe:
//!
//! ```text
//!   Prober ──► ProbeReport ──► classify ──► Classification ──► select ──► Action
//!                                                                          │
//!                                                   Executor (automatic or confirmed)
//! ```
//!
//! Safety rests on file-path disjointness alone. Anything that cannot be
//! proven disjoint is stopped and left to a human.

mod classify;
mod cycle;
mod disjoint;
mod error;
mod execute;
mod model;
mod probe;
mod select;

pub use classify::classify;
pub use cycle::{CycleState, IllegalTransition, Reconciler, Scan};
pub use disjoint::{Overlap, overlaps};
pub use error::{ErrorKind, HerdError, MergeConflictError, ProbeError, RemoteError};
pub use execute::Executor;
pub use model::{
    Action, ActionResult, BranchFacts, Classification, CycleReport, MainFacts, Outcome, ProbeReport, Trigger,
};
pub use probe::Prober;
pub use select::select;
