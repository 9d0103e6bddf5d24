//! Reconciliation errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::git::GitError;
use crate::lock::LockError;

/// Failure while reading a repository's commit graph
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Remote {remote} unreachable: {source}")]
    Fetch {
        remote: String,
        #[source]
        source: GitError,
    },

    #[error("Missing ref {refname}")]
    MissingRef { refname: String },

    #[error("Git query failed: {0}")]
    Query(#[source] GitError),

    #[error("Git timed out while probing: {0}")]
    Timeout(#[source] GitError),

    #[error("Failed to read branch settings: {0}")]
    Settings(#[from] herdstore::StoreError),
}

impl ProbeError {
    /// Classify a failed query, keeping timeouts distinct
    pub fn query(err: GitError) -> Self {
        if err.is_timeout() { Self::Timeout(err) } else { Self::Query(err) }
    }
}

/// Failure while changing the repository or the remote
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Push of {refspec} rejected: {stderr}")]
    PushRejected { refspec: String, stderr: String },

    #[error("Cannot fast-forward {branch} to {target}")]
    FastForwardRejected { branch: String, target: String },

    #[error("Git command failed: {0}")]
    Command(#[source] GitError),

    #[error("Git timed out: {0}")]
    Timeout(#[source] GitError),
}

impl RemoteError {
    /// Map a failed push, recognising remote rejections
    pub fn push(refspec: impl Into<String>, err: GitError) -> Self {
        if err.is_timeout() {
            return Self::Timeout(err);
        }
        let stderr = err.stderr();
        if stderr.contains("rejected") || stderr.contains("non-fast-forward") {
            return Self::PushRejected {
                refspec: refspec.into(),
                stderr: stderr.to_string(),
            };
        }
        Self::Command(err)
    }
}

impl From<GitError> for RemoteError {
    fn from(err: GitError) -> Self {
        if err.is_timeout() { Self::Timeout(err) } else { Self::Command(err) }
    }
}

/// Content-level conflict surfaced while merging branches proven path-disjoint
#[derive(Debug, Error)]
#[error("Merging {branch} conflicts on {}", if paths.is_empty() { "unknown paths".to_string() } else { paths.join(", ") })]
pub struct MergeConflictError {
    pub branch: String,
    pub paths: Vec<String>,
}

/// Coarse category of a failure, carried in results and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Probe,
    Remote,
    MergeConflict,
    Config,
    Lock,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Probe => "probe",
            Self::Remote => "remote",
            Self::MergeConflict => "merge-conflict",
            Self::Config => "config",
            Self::Lock => "lock",
        };
        write!(f, "{}", name)
    }
}

/// Any error a reconciliation cycle can hit
#[derive(Debug, Error)]
pub enum HerdError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    MergeConflict(#[from] MergeConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl HerdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Probe(_) => ErrorKind::Probe,
            Self::Remote(_) => ErrorKind::Remote,
            Self::MergeConflict(_) => ErrorKind::MergeConflict,
            Self::Config(_) => ErrorKind::Config,
            Self::Lock(_) => ErrorKind::Lock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> GitError {
        GitError::Failed {
            command: "git push origin main".to_string(),
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_push_rejection_is_recognised() {
        let err = RemoteError::push("main:main", failed("! [rejected] main -> main (non-fast-forward)"));
        assert!(matches!(err, RemoteError::PushRejected { .. }));

        let err = RemoteError::push("main:main", failed("fatal: Authentication failed"));
        assert!(matches!(err, RemoteError::Command(_)));
    }

    #[test]
    fn test_timeouts_stay_timeouts() {
        let timeout = || GitError::Timeout {
            command: "git fetch".to_string(),
            timeout_ms: 5,
        };
        assert!(matches!(ProbeError::query(timeout()), ProbeError::Timeout(_)));
        assert!(matches!(RemoteError::from(timeout()), RemoteError::Timeout(_)));
        assert!(matches!(RemoteError::push("x", timeout()), RemoteError::Timeout(_)));
    }

    #[test]
    fn test_kind() {
        let err: HerdError = ProbeError::MissingRef {
            refname: "refs/heads/main".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Probe);

        let err: HerdError = MergeConflictError {
            branch: "claude/x".to_string(),
            paths: vec!["src/x.txt".to_string()],
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::MergeConflict);
        assert_eq!(err.to_string(), "Merging claude/x conflicts on src/x.txt");

        let err: HerdError = LockError::Join {
            path: "/work/app/.git/githerd.lock".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Lock);
        assert_eq!(err.kind().to_string(), "lock");
    }
}
