//! Repository state prober

use std::collections::BTreeSet;
use std::sync::Arc;

use herdstore::SettingsStore;
use tracing::{debug, info};

use super::error::ProbeError;
use super::model::{BranchFacts, MainFacts, ProbeReport};
use crate::config::RepoConfig;
use crate::git::{GitClient, local_ref, remote_ref};

/// Reads the commit graph of a repository into a [`ProbeReport`]
pub struct Prober {
    git: Arc<dyn GitClient>,
    store: Arc<dyn SettingsStore>,
    default_enabled: bool,
}

impl Prober {
    /// `default_enabled` applies to branches with no stored flag
    pub fn new(git: Arc<dyn GitClient>, store: Arc<dyn SettingsStore>, default_enabled: bool) -> Self {
        Self {
            git,
            store,
            default_enabled,
        }
    }

    pub async fn probe(&self, repo: &RepoConfig) -> Result<ProbeReport, ProbeError> {
        debug!(repo = %repo.path.display(), remote = %repo.remote, "Prober::probe: called");
        let path = repo.path.as_path();

        self.git.fetch(path, &repo.remote).await.map_err(|source| {
            if source.is_timeout() {
                ProbeError::Timeout(source)
            } else {
                ProbeError::Fetch {
                    remote: repo.remote.clone(),
                    source,
                }
            }
        })?;

        let local_main = local_ref(&repo.main_branch);
        let remote_main = remote_ref(&repo.remote, &repo.main_branch);
        let local_tip = self.require_ref(repo, &local_main).await?;
        let remote_tip = self.require_ref(repo, &remote_main).await?;

        let counts = self
            .git
            .ahead_behind(path, &remote_main, &local_main)
            .await
            .map_err(ProbeError::query)?;
        let main = MainFacts {
            local_ahead: counts.ahead,
            local_behind: counts.behind,
            local_tip,
            remote_tip,
        };

        let names: Vec<String> = self
            .git
            .list_remote_branches(path, &repo.remote)
            .await
            .map_err(ProbeError::query)?
            .into_iter()
            .filter(|name| name.starts_with(&repo.branch_prefix) && name != &repo.main_branch && name != "HEAD")
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let flags = self.store.branch_flags(path)?;
        let mut branches = Vec::with_capacity(names.len());
        for name in names {
            let enabled = flags.get(&name).copied().unwrap_or(self.default_enabled);
            branches.push(self.probe_branch(repo, &remote_main, name, enabled).await?);
        }

        info!(
            repo = %path.display(),
            local_ahead = main.local_ahead,
            local_behind = main.local_behind,
            branches = branches.len(),
            "Probed repository"
        );

        Ok(ProbeReport {
            repo: repo.path.clone(),
            main,
            branches,
        })
    }

    async fn probe_branch(
        &self,
        repo: &RepoConfig,
        remote_main: &str,
        name: String,
        enabled: bool,
    ) -> Result<BranchFacts, ProbeError> {
        let path = repo.path.as_path();
        let branch_ref = remote_ref(&repo.remote, &name);
        let tip = self.require_ref(repo, &branch_ref).await?;

        let counts = self
            .git
            .ahead_behind(path, remote_main, &branch_ref)
            .await
            .map_err(ProbeError::query)?;
        let changed_paths = self.paths(repo, remote_main, &branch_ref).await?;
        let main_changed_paths = if counts.ahead > 0 && counts.behind > 0 {
            self.paths(repo, &branch_ref, remote_main).await?
        } else {
            BTreeSet::new()
        };

        debug!(
            branch = %name,
            enabled,
            ahead = counts.ahead,
            behind = counts.behind,
            changed = changed_paths.len(),
            "Prober::probe_branch: done"
        );

        Ok(BranchFacts {
            name,
            enabled,
            tip,
            ahead: counts.ahead,
            behind: counts.behind,
            changed_paths,
            main_changed_paths,
        })
    }

    async fn paths(&self, repo: &RepoConfig, base: &str, tip: &str) -> Result<BTreeSet<String>, ProbeError> {
        self.git
            .changed_paths(&repo.path, base, tip)
            .await
            .map_err(ProbeError::query)
    }

    async fn require_ref(&self, repo: &RepoConfig, refname: &str) -> Result<String, ProbeError> {
        match self.git.resolve_ref(&repo.path, refname).await {
            Ok(Some(sha)) => Ok(sha),
            Ok(None) => Err(ProbeError::MissingRef {
                refname: refname.to_string(),
            }),
            Err(e) => Err(ProbeError::query(e)),
        }
    }
}
