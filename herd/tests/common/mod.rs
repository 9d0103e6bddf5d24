//! Real git fixtures: a bare remote, the watched clone and an agent clone

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .output()
        .unwrap();
    assert!(output.status.success(), "git {:?} failed: {:?}", args, output);
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

pub fn commit(dir: &Path, file: &str, content: &str) -> String {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    git(dir, &["add", file]);
    git(dir, &["commit", "-q", "-m", file]);
    git(dir, &["rev-parse", "HEAD"])
}

fn configure(dir: &Path) {
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@example.com"]);
}

pub struct Fixture {
    pub temp: TempDir,
    pub remote: PathBuf,
    pub work: PathBuf,
    pub agent: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let remote = root.join("remote.git");
        let work = root.join("work");
        let agent = root.join("agent");

        git(&root, &["init", "-q", "--bare", "-b", "main", "remote.git"]);

        git(&root, &["init", "-q", "-b", "main", "work"]);
        configure(&work);
        git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
        commit(&work, "README.md", "hello\n");
        git(&work, &["push", "-q", "-u", "origin", "main"]);

        git(&root, &["clone", "-q", remote.to_str().unwrap(), "agent"]);
        configure(&agent);

        Self {
            temp,
            remote,
            work,
            agent,
        }
    }

    /// Push `branch`, forked from the remote's main, with one commit per file
    pub fn push_branch(&self, branch: &str, files: &[&str]) -> String {
        git(&self.agent, &["fetch", "-q", "origin"]);
        git(&self.agent, &["checkout", "-q", "-B", branch, "origin/main"]);
        for file in files {
            commit(&self.agent, file, &format!("{} on {}\n", file, branch));
        }
        git(&self.agent, &["push", "-q", "-f", "origin", branch]);
        git(&self.agent, &["rev-parse", "HEAD"])
    }

    pub fn remote_rev(&self, branch: &str) -> String {
        git(&self.remote, &["rev-parse", branch])
    }

    pub fn work_rev(&self, refname: &str) -> String {
        git(&self.work, &["rev-parse", refname])
    }
}
