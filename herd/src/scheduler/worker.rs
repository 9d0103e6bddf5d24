//! RepoWorker - the task that owns one repository's cycles

use std::sync::Arc;
use std::time::Duration;

use herdstore::SettingsStore;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::TriggerRequest;
use crate::config::RepoConfig;
use crate::reconcile::{Reconciler, Trigger};

pub struct RepoWorker {
    reconciler: Arc<Reconciler>,
    repo: RepoConfig,
    triggers: mpsc::Receiver<TriggerRequest>,
    shutdown: watch::Receiver<bool>,
    run_on_start: bool,
}

fn timer(period: Duration, immediate: bool) -> Interval {
    let start = if immediate { Instant::now() } else { Instant::now() + period };
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl RepoWorker {
    pub fn new(
        reconciler: Arc<Reconciler>,
        repo: RepoConfig,
        triggers: mpsc::Receiver<TriggerRequest>,
        shutdown: watch::Receiver<bool>,
        run_on_start: bool,
    ) -> Self {
        Self {
            reconciler,
            repo,
            triggers,
            shutdown,
            run_on_start,
        }
    }

    /// Run until shutdown is signalled or every trigger sender is gone
    pub async fn run(mut self) {
        let mut period = self.repo.interval();
        debug!(repo = %self.repo.path.display(), ?period, "RepoWorker::run: starting");
        let mut interval = timer(period, self.run_on_start);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!(repo = %self.repo.path.display(), "RepoWorker::run: shutdown signalled");
                        break;
                    }
                }

                request = self.triggers.recv() => {
                    let Some(request) = request else {
                        debug!(repo = %self.repo.path.display(), "RepoWorker::run: trigger channel closed");
                        break;
                    };
                    self.handle_request(request).await;
                }

                _ = interval.tick() => {
                    self.handle_tick().await;
                }
            }

            let next = self.current_period();
            if next != period {
                info!(repo = %self.repo.path.display(), ?period, ?next, "Polling interval changed");
                period = next;
                interval = timer(period, false);
            }
        }

        info!(repo = %self.repo.path.display(), "Worker stopped");
    }

    async fn handle_request(&self, request: TriggerRequest) {
        debug!(repo = %self.repo.path.display(), trigger = %request.trigger, "RepoWorker::handle_request: called");
        let report = self.reconciler.run_cycle(&self.repo, request.trigger).await;
        if let Some(reply) = request.reply
            && reply.send(report).is_err()
        {
            debug!("RepoWorker::handle_request: requester went away");
        }
    }

    async fn handle_tick(&self) {
        let polling = match self.reconciler.store().polling(&self.repo.path) {
            Ok(polling) => polling,
            Err(e) => {
                warn!(repo = %self.repo.path.display(), error = %e, "Failed to read polling flag");
                true
            }
        };
        if !polling {
            debug!(repo = %self.repo.path.display(), "RepoWorker::handle_tick: polling paused");
            return;
        }
        self.reconciler.run_cycle(&self.repo, Trigger::Timer).await;
    }

    /// Interval from the overlay file, falling back to the configured one
    fn current_period(&self) -> Duration {
        match self.repo.with_overlay() {
            Ok(repo) => repo.interval(),
            Err(e) => {
                debug!(error = %e, "RepoWorker::current_period: keeping interval");
                self.repo.interval()
            }
        }
    }
}
