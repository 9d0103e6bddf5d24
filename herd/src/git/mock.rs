//! In-memory GitClient for unit tests
//!
//! Models a tiny commit graph with one local repository, its remote-tracking
//! refs and the remote itself, so that ahead/behind counts, ancestry, pushes
//! and merges behave like git for the shapes the engine cares about.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::debug;

use super::client::{AheadBehind, GitClient, MergeOutcome};
use super::error::GitError;

#[derive(Debug, Clone, Default)]
struct Commit {
    parents: Vec<String>,
    paths: BTreeSet<String>,
}

/// Failure injected into a named operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Timeout,
    Rejected,
    Failed,
}

#[derive(Debug, Default)]
struct Graph {
    commits: HashMap<String, Commit>,
    local: BTreeMap<String, String>,
    remote: BTreeMap<String, String>,
    tracking: BTreeMap<String, String>,
    head: Option<String>,
    next: usize,
}

impl Graph {
    fn add_commit(&mut self, parents: Vec<String>, paths: &[&str]) -> String {
        self.next += 1;
        let sha = format!("c{}", self.next);
        self.commits.insert(
            sha.clone(),
            Commit {
                parents,
                paths: paths.iter().map(|p| p.to_string()).collect(),
            },
        );
        sha
    }

    fn resolve(&self, rev: &str) -> Option<String> {
        if let Some(branch) = rev.strip_prefix("refs/heads/") {
            return self.local.get(branch).cloned();
        }
        if let Some(rest) = rev.strip_prefix("refs/remotes/") {
            let branch = rest.split_once('/').map(|(_, b)| b)?;
            return self.tracking.get(branch).cloned();
        }
        if self.commits.contains_key(rev) {
            return Some(rev.to_string());
        }
        self.local.get(rev).cloned()
    }

    fn ancestors(&self, sha: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![sha.to_string()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&next) {
                stack.extend(commit.parents.iter().cloned());
            }
        }
        seen
    }

    fn paths_between(&self, base: &str, tip: &str) -> BTreeSet<String> {
        let base_anc = self.ancestors(base);
        self.ancestors(tip)
            .difference(&base_anc)
            .filter_map(|sha| self.commits.get(sha))
            .flat_map(|c| c.paths.iter().cloned())
            .collect()
    }
}

/// Recording fake with an in-memory commit graph
pub struct FakeGit {
    graph: Mutex<Graph>,
    calls: Mutex<Vec<String>>,
    faults: Mutex<HashMap<String, Fault>>,
    force_conflict: Mutex<bool>,
    conflicts: Mutex<HashSet<String>>,
    git_dirs: TempDir,
    fetch_delay: Mutex<Duration>,
    in_flight: Mutex<HashMap<PathBuf, usize>>,
    max_in_flight: Mutex<HashMap<PathBuf, usize>>,
    max_total_in_flight: Mutex<usize>,
}

impl FakeGit {
    /// One root commit on `main`, pushed, with `main` checked out
    pub fn new() -> Self {
        let mut graph = Graph::default();
        let root = graph.add_commit(Vec::new(), &["README.md"]);
        graph.local.insert("main".to_string(), root.clone());
        graph.remote.insert("main".to_string(), root.clone());
        graph.tracking.insert("main".to_string(), root);
        graph.head = Some("main".to_string());
        debug!("FakeGit::new: called");
        Self {
            graph: Mutex::new(graph),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            force_conflict: Mutex::new(false),
            conflicts: Mutex::new(HashSet::new()),
            git_dirs: TempDir::new().expect("FakeGit: temp dir"),
            fetch_delay: Mutex::new(Duration::ZERO),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight: Mutex::new(HashMap::new()),
            max_total_in_flight: Mutex::new(0),
        }
    }

    /// Commit on a local branch (created from local main if missing)
    pub fn commit_local(&self, branch: &str, paths: &[&str]) -> String {
        let mut graph = self.graph.lock().unwrap();
        let parent = graph
            .local
            .get(branch)
            .or_else(|| graph.local.get("main"))
            .cloned()
            .unwrap();
        let sha = graph.add_commit(vec![parent], paths);
        graph.local.insert(branch.to_string(), sha.clone());
        sha
    }

    /// Commit directly on the remote (created from remote main if missing),
    /// as another collaborator would; visible locally after the next fetch
    pub fn commit_remote(&self, branch: &str, paths: &[&str]) -> String {
        let mut graph = self.graph.lock().unwrap();
        let parent = graph
            .remote
            .get(branch)
            .or_else(|| graph.remote.get("main"))
            .cloned()
            .unwrap();
        let sha = graph.add_commit(vec![parent], paths);
        graph.remote.insert(branch.to_string(), sha.clone());
        sha
    }

    /// Create a remote branch pointing at remote main's current tip
    pub fn branch_remote(&self, branch: &str) {
        let mut graph = self.graph.lock().unwrap();
        let tip = graph.remote.get("main").cloned().unwrap();
        graph.remote.insert(branch.to_string(), tip);
    }

    pub fn checkout(&self, branch: Option<&str>) {
        self.graph.lock().unwrap().head = branch.map(str::to_string);
    }

    pub fn fault(&self, op: &str, fault: Fault) {
        self.faults.lock().unwrap().insert(op.to_string(), fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    pub fn force_conflict(&self, conflict: bool) {
        *self.force_conflict.lock().unwrap() = conflict;
    }

    /// Make every merge of `rev` conflict
    pub fn conflict_on(&self, rev: &str) {
        self.conflicts.lock().unwrap().insert(rev.to_string());
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn local_tip(&self, branch: &str) -> Option<String> {
        self.graph.lock().unwrap().local.get(branch).cloned()
    }

    pub fn remote_tip(&self, branch: &str) -> Option<String> {
        self.graph.lock().unwrap().remote.get(branch).cloned()
    }

    /// Every call made, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change a repository or the remote
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                ["push ", "fast_forward ", "merge ", "merge_abort", "reset ", "delete "]
                    .iter()
                    .any(|m| c.starts_with(m))
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Highest number of overlapping fetches seen for one repository
    pub fn max_in_flight(&self, repo: &Path) -> usize {
        self.max_in_flight.lock().unwrap().get(repo).copied().unwrap_or(0)
    }

    pub fn max_total_in_flight(&self) -> usize {
        *self.max_total_in_flight.lock().unwrap()
    }

    fn record(&self, op: &str, call: String) -> Result<(), GitError> {
        self.calls.lock().unwrap().push(call.clone());
        match self.faults.lock().unwrap().get(op) {
            None => Ok(()),
            Some(Fault::Timeout) => Err(GitError::Timeout {
                command: call,
                timeout_ms: 10,
            }),
            Some(Fault::Rejected) => Err(GitError::Failed {
                command: call,
                code: Some(1),
                stderr: "! [rejected]        main -> main (fetch first)".to_string(),
            }),
            Some(Fault::Failed) => Err(GitError::Failed {
                command: call,
                code: Some(128),
                stderr: "fatal: could not read from remote repository".to_string(),
            }),
        }
    }

    fn failed(call: &str, stderr: &str) -> GitError {
        GitError::Failed {
            command: call.to_string(),
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }

    fn enter(&self, repo: &Path) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(repo.to_path_buf()).or_default();
        *count += 1;
        let current = *count;
        let total: usize = in_flight.values().sum();
        drop(in_flight);

        let mut max = self.max_in_flight.lock().unwrap();
        let entry = max.entry(repo.to_path_buf()).or_default();
        *entry = (*entry).max(current);
        let mut max_total = self.max_total_in_flight.lock().unwrap();
        *max_total = (*max_total).max(total);
    }

    fn leave(&self, repo: &Path) {
        if let Some(count) = self.in_flight.lock().unwrap().get_mut(repo) {
            *count -= 1;
        }
    }
}

impl Default for FakeGit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitClient for FakeGit {
    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), GitError> {
        self.enter(repo);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.leave(repo);

        self.record("fetch", format!("fetch {}", remote))?;
        let mut graph = self.graph.lock().unwrap();
        graph.tracking = graph.remote.clone();
        Ok(())
    }

    async fn resolve_ref(&self, _repo: &Path, refname: &str) -> Result<Option<String>, GitError> {
        self.record("resolve_ref", format!("resolve_ref {}", refname))?;
        Ok(self.graph.lock().unwrap().resolve(refname))
    }

    async fn ahead_behind(&self, _repo: &Path, base: &str, tip: &str) -> Result<AheadBehind, GitError> {
        let call = format!("ahead_behind {} {}", base, tip);
        self.record("ahead_behind", call.clone())?;
        let graph = self.graph.lock().unwrap();
        let (Some(b), Some(t)) = (graph.resolve(base), graph.resolve(tip)) else {
            return Err(Self::failed(&call, "fatal: ambiguous argument"));
        };
        let base_anc = graph.ancestors(&b);
        let tip_anc = graph.ancestors(&t);
        Ok(AheadBehind {
            ahead: tip_anc.difference(&base_anc).count() as u32,
            behind: base_anc.difference(&tip_anc).count() as u32,
        })
    }

    async fn changed_paths(&self, _repo: &Path, base: &str, tip: &str) -> Result<BTreeSet<String>, GitError> {
        let call = format!("changed_paths {} {}", base, tip);
        self.record("changed_paths", call.clone())?;
        let graph = self.graph.lock().unwrap();
        let (Some(b), Some(t)) = (graph.resolve(base), graph.resolve(tip)) else {
            return Err(Self::failed(&call, "fatal: ambiguous argument"));
        };
        Ok(graph.paths_between(&b, &t))
    }

    async fn list_remote_branches(&self, _repo: &Path, remote: &str) -> Result<Vec<String>, GitError> {
        self.record("list_remote_branches", format!("list_remote_branches {}", remote))?;
        Ok(self.graph.lock().unwrap().tracking.keys().cloned().collect())
    }

    async fn current_branch(&self, _repo: &Path) -> Result<Option<String>, GitError> {
        self.record("current_branch", "current_branch".to_string())?;
        Ok(self.graph.lock().unwrap().head.clone())
    }

    async fn is_ancestor(&self, _repo: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let call = format!("is_ancestor {} {}", ancestor, descendant);
        self.record("is_ancestor", call.clone())?;
        let graph = self.graph.lock().unwrap();
        let (Some(a), Some(d)) = (graph.resolve(ancestor), graph.resolve(descendant)) else {
            return Err(Self::failed(&call, "fatal: Not a valid object name"));
        };
        Ok(graph.ancestors(&d).contains(&a))
    }

    async fn fast_forward(&self, _repo: &Path, branch: &str, target: &str) -> Result<(), GitError> {
        let call = format!("fast_forward {} {}", branch, target);
        self.record("fast_forward", call.clone())?;
        let mut graph = self.graph.lock().unwrap();
        let Some(t) = graph.resolve(target) else {
            return Err(Self::failed(&call, "fatal: invalid refspec"));
        };
        if let Some(current) = graph.local.get(branch)
            && !graph.ancestors(&t).contains(current)
        {
            return Err(Self::failed(&call, "fatal: Not possible to fast-forward, aborting."));
        }
        graph.local.insert(branch.to_string(), t);
        Ok(())
    }

    async fn push(&self, _repo: &Path, remote: &str, src: &str, dst: &str) -> Result<(), GitError> {
        let call = format!("push {} {}:{}", remote, src, dst);
        self.record("push", call.clone())?;
        let mut graph = self.graph.lock().unwrap();
        let Some(s) = graph.resolve(src) else {
            return Err(Self::failed(&call, "error: src refspec does not match any"));
        };
        if let Some(current) = graph.remote.get(dst)
            && !graph.ancestors(&s).contains(current)
        {
            return Err(Self::failed(&call, "! [rejected] (non-fast-forward)"));
        }
        graph.remote.insert(dst.to_string(), s.clone());
        graph.tracking.insert(dst.to_string(), s);
        Ok(())
    }

    async fn merge(&self, _repo: &Path, rev: &str, message: &str) -> Result<MergeOutcome, GitError> {
        let call = format!("merge {} {}", rev, message);
        self.record("merge", call.clone())?;
        let force_conflict = *self.force_conflict.lock().unwrap() || self.conflicts.lock().unwrap().contains(rev);
        let mut graph = self.graph.lock().unwrap();
        let Some(head) = graph.head.clone() else {
            return Err(Self::failed(&call, "fatal: You are not currently on a branch"));
        };
        let (Some(ours), Some(theirs)) = (graph.local.get(&head).cloned(), graph.resolve(rev)) else {
            return Err(Self::failed(&call, "merge: not something we can merge"));
        };
        if graph.ancestors(&ours).contains(&theirs) {
            return Ok(MergeOutcome::Merged);
        }

        let our_paths = graph.paths_between(&theirs, &ours);
        let their_paths = graph.paths_between(&ours, &theirs);
        let overlap: Vec<String> = our_paths.intersection(&their_paths).cloned().collect();
        if force_conflict || !overlap.is_empty() {
            return Ok(MergeOutcome::Conflict { paths: overlap });
        }

        let merged = if graph.ancestors(&theirs).contains(&ours) {
            theirs
        } else {
            graph.add_commit(vec![ours, theirs], &[])
        };
        graph.local.insert(head, merged);
        Ok(MergeOutcome::Merged)
    }

    async fn merge_abort(&self, _repo: &Path) -> Result<(), GitError> {
        self.record("merge_abort", "merge_abort".to_string())
    }

    async fn reset_hard(&self, _repo: &Path, rev: &str) -> Result<(), GitError> {
        let call = format!("reset {}", rev);
        self.record("reset", call.clone())?;
        let mut graph = self.graph.lock().unwrap();
        let (Some(head), Some(target)) = (graph.head.clone(), graph.resolve(rev)) else {
            return Err(Self::failed(&call, "fatal: ambiguous argument"));
        };
        graph.local.insert(head, target);
        Ok(())
    }

    async fn delete_remote_branch(&self, _repo: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        let call = format!("delete {} {}", remote, branch);
        self.record("delete", call.clone())?;
        let mut graph = self.graph.lock().unwrap();
        if graph.remote.remove(branch).is_none() {
            return Err(Self::failed(&call, "error: unable to delete: remote ref does not exist"));
        }
        graph.tracking.remove(branch);
        Ok(())
    }

    async fn is_repository(&self, _path: &Path) -> Result<bool, GitError> {
        self.record("is_repository", "is_repository".to_string())?;
        Ok(true)
    }

    async fn git_dir(&self, repo: &Path) -> Result<PathBuf, GitError> {
        // Not recorded: locating metadata touches neither the repository nor the remote
        let name = repo.to_string_lossy().replace(['/', '\\'], "_");
        let dir = self.git_dirs.path().join(name);
        std::fs::create_dir_all(&dir).map_err(|source| GitError::Spawn {
            command: "git rev-parse --git-common-dir".to_string(),
            source,
        })?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> PathBuf {
        PathBuf::from("/fake")
    }

    #[tokio::test]
    async fn test_remote_commits_visible_after_fetch() {
        let git = FakeGit::new();
        git.commit_remote("claude/x", &["a.txt"]);

        assert!(git.list_remote_branches(&repo(), "origin").await.unwrap().len() == 1);
        git.fetch(&repo(), "origin").await.unwrap();
        assert_eq!(
            git.list_remote_branches(&repo(), "origin").await.unwrap(),
            vec!["claude/x".to_string(), "main".to_string()]
        );

        let counts = git
            .ahead_behind(&repo(), "refs/remotes/origin/main", "refs/remotes/origin/claude/x")
            .await
            .unwrap();
        assert_eq!(counts, AheadBehind { ahead: 1, behind: 0 });
    }

    #[tokio::test]
    async fn test_non_fast_forward_push_is_rejected() {
        let git = FakeGit::new();
        git.commit_remote("main", &["theirs.txt"]);
        git.commit_local("main", &["ours.txt"]);

        let err = git.push(&repo(), "origin", "refs/heads/main", "main").await.unwrap_err();
        assert!(err.stderr().contains("rejected"));
    }

    #[tokio::test]
    async fn test_merge_detects_overlapping_paths() {
        let git = FakeGit::new();
        git.commit_remote("claude/x", &["shared.txt"]);
        git.commit_local("main", &["shared.txt"]);
        git.fetch(&repo(), "origin").await.unwrap();

        let outcome = git
            .merge(&repo(), "refs/remotes/origin/claude/x", "Merge claude/x")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Conflict {
                paths: vec!["shared.txt".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_reset_moves_checked_out_branch() {
        let git = FakeGit::new();
        let base = git.local_tip("main").unwrap();
        git.commit_local("main", &["extra.txt"]);

        git.reset_hard(&repo(), &base).await.unwrap();
        assert_eq!(git.local_tip("main"), Some(base));
        assert_eq!(git.mutations(), vec![format!("reset {}", git.local_tip("main").unwrap())]);
    }

    #[tokio::test]
    async fn test_git_dir_is_per_repository() {
        let git = FakeGit::new();
        let a = git.git_dir(Path::new("/work/a")).await.unwrap();
        let b = git.git_dir(Path::new("/work/b")).await.unwrap();
        assert!(a.is_dir());
        assert_ne!(a, b);
        assert_eq!(git.git_dir(Path::new("/work/a")).await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let git = FakeGit::new();
        git.fault("fetch", Fault::Timeout);
        assert!(git.fetch(&repo(), "origin").await.unwrap_err().is_timeout());
        git.clear_faults();
        assert!(git.fetch(&repo(), "origin").await.is_ok());
    }
}
