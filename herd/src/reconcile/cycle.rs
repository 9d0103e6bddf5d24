//! Reconciliation cycle
//!
//! One cycle walks `Probing -> Classifying -> Acting -> Done`, or ends in
//! `Errored` from any non-terminal state. Nothing survives a cycle except the
//! repository's health and branch flags in the settings store.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use herdstore::{Health, SettingsStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::classify::classify;
use super::error::HerdError;
use super::execute::Executor;
use super::model::{Action, ActionResult, Classification, CycleReport, ProbeReport, Trigger};
use super::probe::Prober;
use super::select::select;
use crate::config::RepoConfig;
use crate::events::{EventBus, EventEmitter};
use crate::git::GitClient;
use crate::lock::{self, RepoLock};

/// Where a cycle is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Probing,
    Classifying,
    Acting,
    Done,
    Errored,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Illegal cycle transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: CycleState,
    pub to: CycleState,
}

impl CycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }

    pub fn can_transition_to(&self, next: CycleState) -> bool {
        match (self, next) {
            (from, Self::Errored) => !from.is_terminal(),
            (Self::Probing, Self::Classifying) => true,
            (Self::Classifying, Self::Acting | Self::Done) => true,
            (Self::Acting, Self::Done) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: CycleState) -> Result<CycleState, IllegalTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(IllegalTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probing => write!(f, "probing"),
            Self::Classifying => write!(f, "classifying"),
            Self::Acting => write!(f, "acting"),
            Self::Done => write!(f, "done"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Read-only view of a repository: what a cycle would do right now
#[derive(Debug, Clone, Serialize)]
pub struct Scan {
    pub config: RepoConfig,
    pub report: ProbeReport,
    pub classification: Classification,
    pub action: Action,
}

/// Runs reconciliation cycles for any number of repositories
///
/// Holds no per-repository state. Every cycle and scan holds the
/// repository's cross-process lock, so cycles never overlap even when several
/// reconcilers or processes watch the same repository.
pub struct Reconciler {
    git: Arc<dyn GitClient>,
    store: Arc<dyn SettingsStore>,
    prober: Prober,
    executor: Executor,
    bus: Arc<EventBus>,
}

impl Reconciler {
    pub fn new(
        git: Arc<dyn GitClient>,
        store: Arc<dyn SettingsStore>,
        bus: Arc<EventBus>,
        default_enabled: bool,
    ) -> Self {
        Self {
            prober: Prober::new(git.clone(), store.clone(), default_enabled),
            executor: Executor::new(git.clone()),
            git,
            store,
            bus,
        }
    }

    pub fn git(&self) -> &Arc<dyn GitClient> {
        &self.git
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Take the repository's lock for a mutation made outside a cycle
    pub async fn lock(&self, repo: &RepoConfig) -> Result<RepoLock, HerdError> {
        Ok(lock::acquire(self.git.as_ref(), &repo.path).await?)
    }

    /// Probe, classify and select without acting or touching health
    pub async fn scan(&self, repo: &RepoConfig) -> Result<Scan, HerdError> {
        debug!(repo = %repo.path.display(), "Reconciler::scan: called");
        let _lock = self.lock(repo).await?;
        let config = repo.with_overlay()?;
        let report = self.prober.probe(&config).await?;
        let classification = classify(&report.main, &report.branches);
        let action = select(&classification);
        Ok(Scan {
            config,
            report,
            classification,
            action,
        })
    }

    /// Run one full cycle; always produces a report
    pub async fn run_cycle(&self, repo: &RepoConfig, trigger: Trigger) -> CycleReport {
        let mut cycle = Cycle::start(&self.bus, repo, trigger);
        debug!(repo = %repo.path.display(), %trigger, cycle_id = %cycle.id, "Reconciler::run_cycle: called");

        let _lock = match self.lock(repo).await {
            Ok(lock) => lock,
            Err(e) => {
                warn!(repo = %repo.path.display(), error = %e, "Failed to lock repository");
                return self.fail(cycle, Classification::Error, Action::Error, e);
            }
        };

        let config = match repo.with_overlay() {
            Ok(config) => config,
            Err(e) => {
                warn!(repo = %repo.path.display(), error = %e, "Invalid repository config");
                return self.fail(cycle, Classification::Error, Action::Error, e.into());
            }
        };

        let report = match self.prober.probe(&config).await {
            Ok(report) => report,
            Err(e) => {
                warn!(repo = %repo.path.display(), error = %e, "Probe failed");
                return self.fail(cycle, Classification::Error, Action::Error, e.into());
            }
        };

        cycle.advance(CycleState::Classifying);
        let classification = classify(&report.main, &report.branches);
        cycle.emitter.classified(&classification);
        let action = select(&classification);
        cycle.emitter.action_chosen(&action);
        debug!(%classification, %action, "Reconciler::run_cycle: planned");

        let confirmed_merge = trigger == Trigger::MergeConfirmed && matches!(action, Action::MergeCandidate { .. });
        let settled = match &action {
            Action::None => Some(ActionResult::no_op("Nothing to do")),
            Action::Stop { reason } => Some(ActionResult::stopped(reason.clone())),
            Action::MergeCandidate { branches } if !confirmed_merge => Some(ActionResult::awaiting(format!(
                "{} can be merged into {}; confirm with `githerd merge`",
                branches.join(", "),
                config.main_branch
            ))),
            _ => None,
        };

        let result = match settled {
            Some(result) => result,
            None => {
                cycle.advance(CycleState::Acting);
                match self.executor.execute(&config, &action, &report).await {
                    Ok(result) => result,
                    Err(HerdError::MergeConflict(e)) => {
                        warn!(repo = %repo.path.display(), error = %e, "Merge aborted");
                        ActionResult::stopped(e.to_string())
                    }
                    Err(e) => {
                        error!(repo = %repo.path.display(), error = %e, "Action failed");
                        return self.fail(cycle, classification, action, e);
                    }
                }
            }
        };

        cycle.advance(CycleState::Done);
        info!(repo = %repo.path.display(), %classification, %action, message = %result.message, "Cycle finished");
        self.finish(cycle, classification, action, result, Health::Ok)
    }

    fn fail(&self, mut cycle: Cycle, classification: Classification, action: Action, err: HerdError) -> CycleReport {
        cycle.advance(CycleState::Errored);
        let result = ActionResult::failed(err.kind(), err.to_string());
        self.finish(cycle, classification, action, result, Health::Errored)
    }

    fn finish(
        &self,
        cycle: Cycle,
        classification: Classification,
        action: Action,
        result: ActionResult,
        health: Health,
    ) -> CycleReport {
        cycle.emitter.action_completed(&result);
        self.record_health(&cycle, health);

        let report = CycleReport {
            cycle_id: cycle.id,
            repo: cycle.repo.path.clone(),
            trigger: cycle.trigger,
            state: cycle.state,
            classification,
            action,
            result,
            health,
            started_at: cycle.started_at,
            finished_at: Utc::now(),
        };
        cycle.emitter.cycle_finished(&report);
        report
    }

    fn record_health(&self, cycle: &Cycle, health: Health) {
        let path = cycle.repo.path.as_path();
        let previous = match self.store.health(path) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(repo = %path.display(), error = %e, "Failed to read stored health");
                None
            }
        };
        if previous == Some(health) {
            return;
        }
        if let Err(e) = self.store.set_health(path, health) {
            warn!(repo = %path.display(), error = %e, "Failed to store health");
        }
        info!(repo = %path.display(), ?previous, %health, "Health changed");
        cycle.emitter.health_changed(previous, health);
    }
}

/// Bookkeeping for one in-flight cycle
struct Cycle {
    id: Uuid,
    repo: RepoConfig,
    trigger: Trigger,
    state: CycleState,
    started_at: chrono::DateTime<Utc>,
    emitter: EventEmitter,
}

impl Cycle {
    fn start(bus: &EventBus, repo: &RepoConfig, trigger: Trigger) -> Self {
        let id = Uuid::now_v7();
        let emitter = bus.emitter_for(&repo.path, id);
        emitter.cycle_started(trigger);
        Self {
            id,
            repo: repo.clone(),
            trigger,
            state: CycleState::Probing,
            started_at: Utc::now(),
            emitter,
        }
    }

    fn advance(&mut self, next: CycleState) {
        self.state = match self.state.transition(next) {
            Ok(state) => state,
            Err(e) => {
                error!(cycle_id = %self.id, error = %e, "Cycle state machine violated");
                CycleState::Errored
            }
        };
    }
}
