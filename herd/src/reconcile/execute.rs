//! Action executor
//!
//! Every mutating action first checks whether its goal already holds and
//! reports `NoOp` without touching anything when it does, so running the same
//! action twice is harmless. Errors abort the action immediately; nothing is
//! retried within a cycle.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::error::{HerdError, MergeConflictError, ProbeError, RemoteError};
use super::model::{Action, ActionResult, ProbeReport};
use crate::config::{ConfigError, RepoConfig};
use crate::git::{GitClient, MergeOutcome, local_ref, remote_ref};

/// Performs a chosen [`Action`] against a repository
pub struct Executor {
    git: Arc<dyn GitClient>,
}

impl Executor {
    pub fn new(git: Arc<dyn GitClient>) -> Self {
        Self { git }
    }

    pub async fn execute(
        &self,
        repo: &RepoConfig,
        action: &Action,
        report: &ProbeReport,
    ) -> Result<ActionResult, HerdError> {
        debug!(repo = %repo.path.display(), %action, "Executor::execute: called");
        match action {
            Action::None => Ok(ActionResult::no_op("Nothing to do")),
            Action::PushMain => self.push_main(repo, report).await,
            Action::SyncBehind { branches } => self.sync_behind(repo, branches).await,
            Action::FastForwardPush { branch } => self.fast_forward_push(repo, branch, report).await,
            Action::MergeCandidate { branches } => self.merge_candidate(repo, branches, report).await,
            Action::Stop { reason } => Ok(ActionResult::stopped(reason.clone())),
            Action::Error => Ok(ActionResult::no_op("Nothing executed after an error")),
        }
    }

    async fn push_main(&self, repo: &RepoConfig, report: &ProbeReport) -> Result<ActionResult, HerdError> {
        let local_main = local_ref(&repo.main_branch);
        let remote_main = remote_ref(&repo.remote, &repo.main_branch);

        let counts = self
            .git
            .ahead_behind(&repo.path, &remote_main, &local_main)
            .await
            .map_err(RemoteError::from)?;
        if counts.ahead == 0 {
            return Ok(ActionResult::no_op(format!("{} already pushed", repo.main_branch)));
        }

        self.push(repo, &local_main, &repo.main_branch).await?;
        info!(repo = %repo.path.display(), commits = counts.ahead, "Pushed main");
        let synced = self.fan_out(repo, report).await?;

        Ok(ActionResult::applied(with_fan_out(
            format!(
                "Pushed {} commit(s) to {}/{}",
                counts.ahead, repo.remote, repo.main_branch
            ),
            &synced,
        )))
    }

    async fn sync_behind(&self, repo: &RepoConfig, branches: &[String]) -> Result<ActionResult, HerdError> {
        let remote_main = remote_ref(&repo.remote, &repo.main_branch);

        let mut synced = Vec::new();
        for branch in branches {
            let branch_ref = remote_ref(&repo.remote, branch);
            if self
                .git
                .is_ancestor(&repo.path, &remote_main, &branch_ref)
                .await
                .map_err(RemoteError::from)?
            {
                debug!(%branch, "Executor::sync_behind: already contains main");
                continue;
            }
            self.push(repo, &remote_main, branch).await?;
            info!(repo = %repo.path.display(), %branch, "Synced branch to main");
            synced.push(branch.clone());
        }

        if synced.is_empty() {
            return Ok(ActionResult::no_op("Branches already at main"));
        }
        Ok(ActionResult::applied(format!(
            "Fast-forwarded {} to {}",
            synced.join(", "),
            repo.main_branch
        )))
    }

    async fn fast_forward_push(
        &self,
        repo: &RepoConfig,
        branch: &str,
        report: &ProbeReport,
    ) -> Result<ActionResult, HerdError> {
        let local_main = local_ref(&repo.main_branch);
        let remote_main = remote_ref(&repo.remote, &repo.main_branch);
        let branch_ref = remote_ref(&repo.remote, branch);

        if self.contains(repo, &remote_main, &branch_ref).await? {
            return Ok(ActionResult::no_op(format!("{} already in {}", branch, repo.main_branch)));
        }

        if !self.contains(repo, &branch_ref, &local_main).await? {
            return Err(RemoteError::FastForwardRejected {
                branch: repo.main_branch.clone(),
                target: branch_ref,
            }
            .into());
        }

        self.git
            .fast_forward(&repo.path, &repo.main_branch, &branch_ref)
            .await
            .map_err(|e| {
                warn!(error = %e, "fast-forward failed");
                RemoteError::FastForwardRejected {
                    branch: repo.main_branch.clone(),
                    target: branch_ref.clone(),
                }
            })?;
        self.push(repo, &local_main, &repo.main_branch).await?;
        info!(repo = %repo.path.display(), %branch, "Fast-forwarded main");
        let synced = self.fan_out(repo, report).await?;

        Ok(ActionResult::applied(with_fan_out(
            format!("Fast-forwarded {} to {} and pushed", repo.main_branch, branch),
            &synced,
        )))
    }

    async fn merge_candidate(
        &self,
        repo: &RepoConfig,
        branches: &[String],
        report: &ProbeReport,
    ) -> Result<ActionResult, HerdError> {
        let local_main = local_ref(&repo.main_branch);
        let remote_main = remote_ref(&repo.remote, &repo.main_branch);

        let mut pending = Vec::new();
        for branch in branches {
            if !self.contains(repo, &remote_main, &remote_ref(&repo.remote, branch)).await? {
                pending.push(branch.clone());
            }
        }
        if pending.is_empty() {
            return Ok(ActionResult::no_op("Branches already merged"));
        }
        pending.sort();

        let current = self.git.current_branch(&repo.path).await.map_err(RemoteError::from)?;
        if current.as_deref() != Some(repo.main_branch.as_str()) {
            return Err(ConfigError::MainNotCheckedOut {
                main: repo.main_branch.clone(),
                current: current.unwrap_or_else(|| "detached".to_string()),
            }
            .into());
        }

        if !self.contains(repo, &local_main, &remote_main).await? {
            if !self.contains(repo, &remote_main, &local_main).await? {
                return Err(RemoteError::FastForwardRejected {
                    branch: repo.main_branch.clone(),
                    target: remote_main,
                }
                .into());
            }
            self.git
                .fast_forward(&repo.path, &repo.main_branch, &remote_main)
                .await
                .map_err(RemoteError::from)?;
        }

        let Some(base) = self.git.resolve_ref(&repo.path, &local_main).await.map_err(RemoteError::from)? else {
            return Err(ProbeError::MissingRef { refname: local_main }.into());
        };

        // Nothing below may leave partial merges on local main
        let outcome = match self.merge_all(repo, &pending).await {
            Ok(merged) => self
                .push(repo, &local_main, &repo.main_branch)
                .await
                .map(|()| merged)
                .map_err(HerdError::from),
            Err(e) => Err(e),
        };
        let merged = match outcome {
            Ok(merged) => merged,
            Err(e) => {
                self.restore(repo, &base).await?;
                return Err(e);
            }
        };
        let synced = self.fan_out(repo, report).await?;

        Ok(ActionResult::applied(with_fan_out(
            format!("Merged {} into {} and pushed", merged.join(", "), repo.main_branch),
            &synced,
        )))
    }

    /// Merge each pending branch into the checked-out main, aborting on the first conflict
    async fn merge_all(&self, repo: &RepoConfig, pending: &[String]) -> Result<Vec<String>, HerdError> {
        let local_main = local_ref(&repo.main_branch);
        let mut merged = Vec::new();
        for branch in pending {
            let branch_ref = remote_ref(&repo.remote, branch);
            if self.contains(repo, &local_main, &branch_ref).await? {
                continue;
            }
            let message = format!("Merge {}", branch);
            match self
                .git
                .merge(&repo.path, &branch_ref, &message)
                .await
                .map_err(RemoteError::from)?
            {
                MergeOutcome::Merged => {
                    info!(repo = %repo.path.display(), %branch, "Merged branch");
                    merged.push(branch.clone());
                }
                MergeOutcome::Conflict { paths } => {
                    warn!(repo = %repo.path.display(), %branch, ?paths, "Merge conflict, aborting");
                    self.git.merge_abort(&repo.path).await.map_err(RemoteError::from)?;
                    return Err(MergeConflictError {
                        branch: branch.clone(),
                        paths,
                    }
                    .into());
                }
            }
        }
        Ok(merged)
    }

    /// Put local main back where it was before a failed merge
    async fn restore(&self, repo: &RepoConfig, base: &str) -> Result<(), RemoteError> {
        match self.git.reset_hard(&repo.path, base).await {
            Ok(()) => {
                info!(repo = %repo.path.display(), %base, "Restored main after failed merge");
                Ok(())
            }
            Err(e) => {
                error!(repo = %repo.path.display(), %base, error = %e, "Failed to restore main");
                Err(e.into())
            }
        }
    }

    /// Fast-forward every enabled branch strictly behind the new main on the remote
    async fn fan_out(&self, repo: &RepoConfig, report: &ProbeReport) -> Result<Vec<String>, RemoteError> {
        let local_main = local_ref(&repo.main_branch);
        let Some(main_tip) = self.git.resolve_ref(&repo.path, &local_main).await? else {
            return Ok(Vec::new());
        };

        let mut synced = Vec::new();
        for branch in report.enabled_branches() {
            let branch_ref = remote_ref(&repo.remote, &branch.name);
            let Some(tip) = self.git.resolve_ref(&repo.path, &branch_ref).await? else {
                continue;
            };
            if tip == main_tip || !self.git.is_ancestor(&repo.path, &branch_ref, &local_main).await? {
                continue;
            }
            self.push(repo, &local_main, &branch.name).await?;
            debug!(branch = %branch.name, "Executor::fan_out: synced");
            synced.push(branch.name.clone());
        }
        Ok(synced)
    }

    /// Whether `descendant` already contains `ancestor`
    async fn contains(&self, repo: &RepoConfig, descendant: &str, ancestor: &str) -> Result<bool, RemoteError> {
        Ok(self.git.is_ancestor(&repo.path, ancestor, descendant).await?)
    }

    async fn push(&self, repo: &RepoConfig, src: &str, dst: &str) -> Result<(), RemoteError> {
        self.git
            .push(&repo.path, &repo.remote, src, dst)
            .await
            .map_err(|e| RemoteError::push(format!("{}:{}", src, dst), e))
    }
}

fn with_fan_out(message: String, synced: &[String]) -> String {
    if synced.is_empty() {
        message
    } else {
        format!("{}; synced {}", message, synced.join(", "))
    }
}
