//! Per-repository lock shared by every githerd process
//!
//! A running `githerd run` and one-shot commands such as `sync`, `merge` or
//! `delete-branch` all take an exclusive advisory lock on
//! `<git-dir>/githerd.lock` before touching a repository, so their fetches,
//! merges and pushes never interleave.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::git::{GitClient, GitError};

const LOCK_FILE: &str = "githerd.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Cannot locate git metadata for {repo}: {source}")]
    Locate {
        repo: PathBuf,
        #[source]
        source: GitError,
    },

    #[error("Failed to lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lock task for {path} failed")]
    Join { path: PathBuf },
}

impl LockError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Held lock; released on drop
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release repository lock");
        }
    }
}

/// Take the repository's lock, waiting for whichever process holds it
pub async fn acquire(git: &dyn GitClient, repo: &Path) -> Result<RepoLock, LockError> {
    let dir = git.git_dir(repo).await.map_err(|source| LockError::Locate {
        repo: repo.to_path_buf(),
        source,
    })?;
    let path = dir.join(LOCK_FILE);
    debug!(path = %path.display(), "lock::acquire: called");

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|e| LockError::io(&path, e))?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => return Ok(RepoLock { file, path }),
        Err(e) if e.kind() != fs2::lock_contended_error().kind() => return Err(LockError::io(&path, e)),
        Err(_) => {}
    }

    info!(repo = %repo.display(), "Waiting for another githerd cycle on this repository");
    let waiting = path.clone();
    let file = tokio::task::spawn_blocking(move || FileExt::lock_exclusive(&file).map(|()| file))
        .await
        .map_err(|_| LockError::Join { path: waiting })?
        .map_err(|e| LockError::io(&path, e))?;
    Ok(RepoLock { file, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::mock::FakeGit;
    use std::time::Duration;

    #[tokio::test]
    async fn test_second_holder_waits_for_release() {
        let git = FakeGit::new();
        let repo = Path::new("/work/app");

        let first = acquire(&git, repo).await.unwrap();
        assert!(first.path().ends_with(LOCK_FILE));

        let pending = tokio::time::timeout(Duration::from_millis(200), acquire(&git, repo)).await;
        assert!(pending.is_err(), "second lock granted while the first is held");

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(5), acquire(&git, repo))
            .await
            .expect("lock not granted after release")
            .unwrap();
        drop(second);
    }

    #[tokio::test]
    async fn test_other_repositories_are_independent() {
        let git = FakeGit::new();
        let _a = acquire(&git, Path::new("/work/a")).await.unwrap();
        let b = tokio::time::timeout(Duration::from_millis(500), acquire(&git, Path::new("/work/b"))).await;
        assert!(b.is_ok());
    }
}
