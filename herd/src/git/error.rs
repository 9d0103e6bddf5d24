//! Git invocation errors

use thiserror::Error;

/// Failure of a single git invocation
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("`{command}` produced non-UTF-8 output")]
    NonUtf8 { command: String },

    #[error("Unexpected output from `{command}`: {output}")]
    Parse { command: String, output: String },
}

impl GitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Standard error text of a failed command, empty otherwise
    pub fn stderr(&self) -> &str {
        match self {
            Self::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }

    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::Failed { command, .. }
            | Self::Timeout { command, .. }
            | Self::NonUtf8 { command }
            | Self::Parse { command, .. } => command,
        }
    }
}
