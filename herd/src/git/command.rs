//! GitClient over the `git` binary

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::client::{AheadBehind, GitClient, MergeOutcome, local_ref};
use super::error::GitError;

/// Shells out to git, bounding every invocation by a timeout
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn describe(args: &[&str]) -> String {
        format!("git {}", args.join(" "))
    }

    /// Run git and return its raw output whatever the exit status
    async fn output(&self, repo: &Path, args: &[&str]) -> Result<Output, GitError> {
        let command = Self::describe(args);
        debug!(repo = %repo.display(), %command, "GitCli::output: running");

        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(repo)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(GitError::Spawn { command, source }),
            Err(_) => {
                warn!(repo = %repo.display(), %command, "git command timed out");
                Err(GitError::Timeout {
                    command,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Run git, failing on a non-zero exit, and return stdout
    async fn run(&self, repo: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = self.output(repo, args).await?;
        if !output.status.success() {
            return Err(Self::failed(args, &output));
        }
        Self::stdout(args, output)
    }

    fn failed(args: &[&str], output: &Output) -> GitError {
        GitError::Failed {
            command: Self::describe(args),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    fn stdout(args: &[&str], output: Output) -> Result<String, GitError> {
        String::from_utf8(output.stdout).map_err(|_| GitError::NonUtf8 {
            command: Self::describe(args),
        })
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git", Duration::from_millis(crate::config::DEFAULT_COMMAND_TIMEOUT_MS))
    }
}

#[async_trait]
impl GitClient for GitCli {
    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), GitError> {
        self.run(repo, &["fetch", "--prune", remote]).await?;
        Ok(())
    }

    async fn resolve_ref(&self, repo: &Path, refname: &str) -> Result<Option<String>, GitError> {
        let spec = format!("{}^{{commit}}", refname);
        let args = ["rev-parse", "--verify", "--quiet", spec.as_str()];
        let output = self.output(repo, &args).await?;
        if !output.status.success() {
            // --quiet makes a missing ref exit 1 with nothing on stderr
            if output.status.code() == Some(1) && output.stderr.is_empty() {
                return Ok(None);
            }
            return Err(Self::failed(&args, &output));
        }
        let sha = Self::stdout(&args, output)?.trim().to_string();
        Ok(Some(sha))
    }

    async fn ahead_behind(&self, repo: &Path, base: &str, tip: &str) -> Result<AheadBehind, GitError> {
        let range = format!("{}...{}", base, tip);
        let args = ["rev-list", "--left-right", "--count", range.as_str()];
        let out = self.run(repo, &args).await?;

        let mut counts = out.split_whitespace().map(str::parse::<u32>);
        match (counts.next(), counts.next(), counts.next()) {
            (Some(Ok(behind)), Some(Ok(ahead)), None) => Ok(AheadBehind { ahead, behind }),
            _ => Err(GitError::Parse {
                command: Self::describe(&args),
                output: out.trim().to_string(),
            }),
        }
    }

    async fn changed_paths(&self, repo: &Path, base: &str, tip: &str) -> Result<BTreeSet<String>, GitError> {
        let range = format!("{}...{}", base, tip);
        let out = self
            .run(repo, &["diff", "--name-only", "--no-renames", "-z", range.as_str()])
            .await?;
        Ok(out.split('\0').filter(|p| !p.is_empty()).map(str::to_string).collect())
    }

    async fn list_remote_branches(&self, repo: &Path, remote: &str) -> Result<Vec<String>, GitError> {
        let pattern = format!("refs/remotes/{}/", remote);
        let out = self
            .run(repo, &["for-each-ref", "--format=%(refname)", pattern.as_str()])
            .await?;
        let mut branches: Vec<String> = out
            .lines()
            .filter_map(|line| line.trim().strip_prefix(&pattern))
            .filter(|name| *name != "HEAD")
            .map(str::to_string)
            .collect();
        branches.sort();
        Ok(branches)
    }

    async fn current_branch(&self, repo: &Path) -> Result<Option<String>, GitError> {
        let args = ["symbolic-ref", "--quiet", "--short", "HEAD"];
        let output = self.output(repo, &args).await?;
        if !output.status.success() {
            if output.status.code() == Some(1) {
                return Ok(None);
            }
            return Err(Self::failed(&args, &output));
        }
        Ok(Some(Self::stdout(&args, output)?.trim().to_string()))
    }

    async fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let args = ["merge-base", "--is-ancestor", ancestor, descendant];
        let output = self.output(repo, &args).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Self::failed(&args, &output)),
        }
    }

    async fn fast_forward(&self, repo: &Path, branch: &str, target: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), branch, target, "GitCli::fast_forward: called");
        if self.current_branch(repo).await?.as_deref() == Some(branch) {
            self.run(repo, &["merge", "--ff-only", target]).await?;
        } else {
            let refspec = format!("{}:{}", target, local_ref(branch));
            self.run(repo, &["fetch", ".", refspec.as_str()]).await?;
        }
        Ok(())
    }

    async fn push(&self, repo: &Path, remote: &str, src: &str, dst: &str) -> Result<(), GitError> {
        let refspec = format!("{}:{}", src, local_ref(dst));
        self.run(repo, &["push", remote, refspec.as_str()]).await?;
        Ok(())
    }

    async fn merge(&self, repo: &Path, rev: &str, message: &str) -> Result<MergeOutcome, GitError> {
        let args = ["merge", "--no-edit", "-m", message, rev];
        let output = self.output(repo, &args).await?;
        if output.status.success() {
            return Ok(MergeOutcome::Merged);
        }

        let unmerged = self
            .run(repo, &["diff", "--name-only", "--diff-filter=U", "-z"])
            .await
            .unwrap_or_default();
        let paths: Vec<String> = unmerged
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !paths.is_empty() || stdout.contains("CONFLICT") {
            return Ok(MergeOutcome::Conflict { paths });
        }
        Err(Self::failed(&args, &output))
    }

    async fn merge_abort(&self, repo: &Path) -> Result<(), GitError> {
        self.run(repo, &["merge", "--abort"]).await?;
        Ok(())
    }

    async fn reset_hard(&self, repo: &Path, rev: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), rev, "GitCli::reset_hard: called");
        self.run(repo, &["reset", "--hard", "--quiet", rev]).await?;
        Ok(())
    }

    async fn delete_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        self.run(repo, &["push", remote, "--delete", branch]).await?;
        Ok(())
    }

    async fn is_repository(&self, path: &Path) -> Result<bool, GitError> {
        if !path.is_dir() {
            return Ok(false);
        }
        let output = self.output(path, &["rev-parse", "--is-inside-work-tree"]).await?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn git_dir(&self, repo: &Path) -> Result<PathBuf, GitError> {
        // The common dir is shared by every worktree of the repository
        let out = self.run(repo, &["rev-parse", "--git-common-dir"]).await?;
        let dir = PathBuf::from(out.trim());
        Ok(if dir.is_absolute() { dir } else { repo.join(dir) })
    }
}
