//! HerdStore - persisted settings for GitHerd
//!
//! A small key-value store keyed by repository path and branch name. It holds the
//! only state GitHerd keeps between reconciliation cycles:
//!
//! - the list of repositories (and which of them are hidden)
//! - per-branch `enabled` flags (sync participation)
//! - per-repository health (`ok` / `errored`)
//!
//! # Layout
//!
//! ```text
//! ~/.config/githerd/
//! ├── settings.json       # the whole document, rewritten atomically
//! └── settings.json.lock  # advisory lock shared by every process
//! ```
//!
//! # Example
//!
//! ```ignore
//! use herdstore::{JsonStore, SettingsStore};
//!
//! let store = JsonStore::open("~/.config/githerd/settings.json")?;
//! store.set_branch_enabled(repo, "claude/feature-x", true)?;
//! assert_eq!(store.branch_enabled(repo, "claude/feature-x")?, Some(true));
//! ```

pub mod cli;
mod error;
mod store;

pub use error::StoreError;
pub use store::{Health, JsonStore, MemoryStore, Settings, SettingsStore, repo_key};

/// File name of the settings document inside the config directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Default location of the settings document (`~/.config/githerd/settings.json`)
pub fn default_settings_path() -> std::path::PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("githerd")
        .join(SETTINGS_FILE)
}
