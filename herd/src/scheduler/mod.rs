//! Per-repository scheduling
//!
//! Every repository gets one tokio task (a [`RepoWorker`]) that owns its
//! cycles. Cycles of one repository never overlap; repositories never wait on
//! each other. Manual triggers queue behind an in-flight cycle and shutdown is
//! only observed between cycles.

mod worker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RepoConfig;
use crate::reconcile::{CycleReport, Reconciler, Trigger};

pub use worker::RepoWorker;

/// Default depth of each repository's trigger queue
pub const DEFAULT_TRIGGER_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Repository not scheduled: {0}")]
    UnknownRepo(PathBuf),

    #[error("Worker for {0} has stopped")]
    WorkerGone(PathBuf),
}

/// A cycle request queued to a repository's worker
#[derive(Debug)]
pub struct TriggerRequest {
    pub trigger: Trigger,
    pub reply: Option<oneshot::Sender<CycleReport>>,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub trigger_capacity: usize,
    /// Run a timer cycle as soon as a worker starts
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trigger_capacity: DEFAULT_TRIGGER_CAPACITY,
            run_on_start: true,
        }
    }
}

/// Spawns repository workers
pub struct Scheduler;

impl Scheduler {
    pub fn spawn(reconciler: Arc<Reconciler>, repos: Vec<RepoConfig>, config: SchedulerConfig) -> SchedulerHandle {
        debug!(repos = repos.len(), ?config, "Scheduler::spawn: called");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut senders = BTreeMap::new();
        let mut tasks = Vec::new();
        for repo in repos {
            if senders.contains_key(&repo.path) {
                warn!(repo = %repo.path.display(), "Scheduler::spawn: duplicate repository skipped");
                continue;
            }
            let (tx, rx) = mpsc::channel(config.trigger_capacity.max(1));
            senders.insert(repo.path.clone(), tx);

            let worker = RepoWorker::new(reconciler.clone(), repo, rx, shutdown_rx.clone(), config.run_on_start);
            tasks.push(tokio::spawn(worker.run()));
        }

        info!(workers = tasks.len(), "Scheduler started");
        SchedulerHandle {
            senders,
            shutdown_tx,
            tasks,
        }
    }
}

/// Handle to running workers
pub struct SchedulerHandle {
    senders: BTreeMap<PathBuf, mpsc::Sender<TriggerRequest>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn repos(&self) -> Vec<PathBuf> {
        self.senders.keys().cloned().collect()
    }

    /// Queue a cycle and get a receiver for its report
    pub async fn request(&self, repo: &Path, trigger: Trigger) -> Result<oneshot::Receiver<CycleReport>, SchedulerError> {
        debug!(repo = %repo.display(), %trigger, "SchedulerHandle::request: called");
        let tx = self
            .senders
            .get(repo)
            .ok_or_else(|| SchedulerError::UnknownRepo(repo.to_path_buf()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(TriggerRequest {
            trigger,
            reply: Some(reply_tx),
        })
        .await
        .map_err(|_| SchedulerError::WorkerGone(repo.to_path_buf()))?;
        Ok(reply_rx)
    }

    /// Queue a cycle and wait for its report
    pub async fn trigger(&self, repo: &Path, trigger: Trigger) -> Result<CycleReport, SchedulerError> {
        let reply = self.request(repo, trigger).await?;
        reply.await.map_err(|_| SchedulerError::WorkerGone(repo.to_path_buf()))
    }

    /// Stop every worker, waiting for in-flight cycles to finish
    pub async fn shutdown(self) {
        debug!("SchedulerHandle::shutdown: called");
        let _ = self.shutdown_tx.send(true);
        drop(self.senders);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Worker task failed");
            }
        }
        info!("Scheduler stopped");
    }
}
