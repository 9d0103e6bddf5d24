//! GitClient trait

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::GitError;

/// Commit counts between two refs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AheadBehind {
    /// Commits reachable from the tip but not from the base
    pub ahead: u32,
    /// Commits reachable from the base but not from the tip
    pub behind: u32,
}

/// Result of a merge attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Conflict { paths: Vec<String> },
}

/// Version-control primitives the engine is built on
///
/// Every method targets the repository at `repo`. Ref arguments accept
/// anything `git rev-parse` would (full ref names are preferred to avoid
/// ambiguity between local and remote-tracking branches).
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Fetch from `remote`, pruning deleted remote branches
    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), GitError>;

    /// Commit id a ref points at, or None if it does not exist
    async fn resolve_ref(&self, repo: &Path, refname: &str) -> Result<Option<String>, GitError>;

    /// Ahead/behind of `tip` relative to `base`
    async fn ahead_behind(&self, repo: &Path, base: &str, tip: &str) -> Result<AheadBehind, GitError>;

    /// Paths changed on `tip` since its merge-base with `base`
    async fn changed_paths(&self, repo: &Path, base: &str, tip: &str) -> Result<BTreeSet<String>, GitError>;

    /// Short names of every remote-tracking branch of `remote`, without the `<remote>/` prefix
    async fn list_remote_branches(&self, repo: &Path, remote: &str) -> Result<Vec<String>, GitError>;

    /// Checked-out branch, None when HEAD is detached
    async fn current_branch(&self, repo: &Path) -> Result<Option<String>, GitError>;

    async fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError>;

    /// Move local `branch` forward to `target`; fails unless it is a fast-forward
    async fn fast_forward(&self, repo: &Path, branch: &str, target: &str) -> Result<(), GitError>;

    /// Push `src` to `refs/heads/<dst>` on `remote`, never forced
    async fn push(&self, repo: &Path, remote: &str, src: &str, dst: &str) -> Result<(), GitError>;

    /// Merge `rev` into the checked-out branch with a merge commit
    async fn merge(&self, repo: &Path, rev: &str, message: &str) -> Result<MergeOutcome, GitError>;

    async fn merge_abort(&self, repo: &Path) -> Result<(), GitError>;

    /// Point the checked-out branch, index and worktree at `rev`
    async fn reset_hard(&self, repo: &Path, rev: &str) -> Result<(), GitError>;

    async fn delete_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), GitError>;

    async fn is_repository(&self, path: &Path) -> Result<bool, GitError>;

    /// Absolute path of the directory holding the repository's git metadata
    async fn git_dir(&self, repo: &Path) -> Result<PathBuf, GitError>;
}

/// Full name of the local branch `branch`
pub fn local_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

/// Full name of the remote-tracking branch `<remote>/<branch>`
pub fn remote_ref(remote: &str, branch: &str) -> String {
    format!("refs/remotes/{}/{}", remote, branch)
}
