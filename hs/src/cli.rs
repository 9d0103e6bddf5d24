//! CLI argument parsing for herdstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hs")]
#[command(author, version, about = "Inspect and edit GitHerd's persisted settings", long_about = None)]
pub struct Cli {
    /// Path to settings file (default: ~/.config/githerd/settings.json)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List repositories with their health and branch flags
    List,

    /// Show the enabled flag of one branch
    Get {
        /// Repository path
        #[arg(required = true)]
        repo: PathBuf,

        /// Branch name
        #[arg(required = true)]
        branch: String,
    },

    /// Set the enabled flag of one branch
    Set {
        /// Repository path
        #[arg(required = true)]
        repo: PathBuf,

        /// Branch name
        #[arg(required = true)]
        branch: String,

        /// true or false
        #[arg(required = true, action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Show or set repository health
    Health {
        /// Repository path
        #[arg(required = true)]
        repo: PathBuf,

        /// New value (ok or errored); prints the current value when omitted
        value: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let cli = Cli::try_parse_from(["hs", "set", "/r", "claude/x", "false"]).unwrap();
        match cli.command {
            Command::Set { repo, branch, enabled } => {
                assert_eq!(repo, PathBuf::from("/r"));
                assert_eq!(branch, "claude/x");
                assert!(!enabled);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_store_flag() {
        let cli = Cli::try_parse_from(["hs", "--store", "/tmp/s.json", "list"]).unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/s.json")));
        assert!(matches!(cli.command, Command::List));
    }
}
