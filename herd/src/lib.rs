//! GitHerd - keeps feature branches and main aligned, safely
//!
//! GitHerd watches git repositories whose tracked branches (by default
//! `claude/*`) are written by autonomous agents. Every cycle it probes each
//! repository, classifies how its branches relate to main and performs the
//! one action that is provably safe: push main, fast-forward a branch, or
//! fast-forward main. Multi-branch merges are offered for confirmation only
//! when the branches touch disjoint files; everything else is stopped and
//! left to a human.
//!
//! # Modules
//!
//! - [`config`] - Global config, per-repo overlays and validation
//! - [`git`] - `GitClient` trait and the `git` CLI implementation
//! - [`reconcile`] - Probe, classify, select and execute
//! - [`scheduler`] - One worker task per repository
//! - [`lock`] - Cross-process per-repository lock
//! - [`events`] - Event bus and JSONL event log
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod git;
pub mod lock;
pub mod reconcile;
pub mod scheduler;

// Re-export commonly used types
pub use config::{Config, ConfigError, RepoConfig};
pub use events::{EventBus, EventEmitter, EventLogEntry, EventLogger, HerdEvent, spawn_event_logger};
pub use git::{GitCli, GitClient, GitError};
pub use reconcile::{
    Action, ActionResult, Classification, CycleReport, CycleState, ErrorKind, HerdError, Outcome, Reconciler, Scan,
    Trigger,
};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, SchedulerHandle};
