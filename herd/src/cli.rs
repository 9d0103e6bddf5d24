//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// GitHerd - keeps agent branches and main aligned
#[derive(Parser)]
#[command(
    name = "githerd",
    about = "Keeps short-lived feature branches aligned with main without guessing at merges",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll repositories in the foreground until Ctrl-C
    Run {
        /// Only these repositories (default: every visible one)
        #[arg(short, long = "repo", value_name = "PATH")]
        repos: Vec<PathBuf>,
    },

    /// Show what a cycle would do right now, without doing it
    Status {
        /// Repository (default: current directory)
        path: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run one cycle now (automatic actions only)
    Sync {
        /// Repository (default: current directory)
        path: Option<PathBuf>,
    },

    /// Confirm and perform an offered merge
    Merge {
        /// Repository (default: current directory)
        path: Option<PathBuf>,
    },

    /// List tracked branches with their position relative to main
    Branches {
        /// Repository (default: current directory)
        path: Option<PathBuf>,
    },

    /// Let a branch take part in reconciliation
    Enable {
        /// Repository path
        path: PathBuf,

        /// Branch name, e.g. claude/fix-login
        branch: String,
    },

    /// Exclude a branch from reconciliation
    Disable {
        /// Repository path
        path: PathBuf,

        /// Branch name, e.g. claude/fix-login
        branch: String,
    },

    /// Delete a tracked branch on the remote
    DeleteBranch {
        /// Repository path
        path: PathBuf,

        /// Branch name
        branch: String,

        /// Required; deletion cannot be undone from here
        #[arg(long)]
        yes: bool,
    },

    /// Manage the persisted repository list
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Show recent events
    Logs {
        /// Repository (default: every repository)
        path: Option<PathBuf>,

        /// Number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,
    },
}

/// Repository list subcommands
#[derive(Debug, Subcommand)]
pub enum RepoCommand {
    /// Add a repository
    Add {
        /// Repository path
        path: PathBuf,
    },

    /// Forget a repository and all its settings
    Remove {
        /// Repository path
        path: PathBuf,
    },

    /// Keep a repository but stop polling it from `run`
    Hide {
        /// Repository path
        path: PathBuf,
    },

    /// Undo `hide`
    Show {
        /// Repository path
        path: PathBuf,
    },

    /// Skip timer cycles; manual `sync` and `merge` still run
    Pause {
        /// Repository path
        path: PathBuf,
    },

    /// Undo `pause`
    Resume {
        /// Repository path
        path: PathBuf,
    },

    /// List repositories with health
    List,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("githerd")
        .join("logs")
        .join("githerd.log")
}

/// Output format for status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
