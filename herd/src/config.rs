//! GitHerd configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default bound on a single git invocation
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 60_000;

/// Default polling interval per repository
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// Per-repository overlay file, read at the start of every cycle
pub const OVERLAY_FILE: &str = ".githerd.yml";

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {field} {value:?}: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{main} must be checked out to merge, HEAD is {current}")]
    MainNotCheckedOut { main: String, current: String },
}

/// Main GitHerd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Git binary and timeouts
    pub git: GitConfig,

    /// Polling behaviour
    pub sync: SyncConfig,

    /// Settings store location
    pub store: StoreConfig,

    /// Event log location
    pub events: EventsConfig,

    /// Per-repo settings applied when a repository does not override them
    pub defaults: RepoDefaults,

    /// Repositories listed in the config file
    pub repos: Vec<RepoEntry>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./githerd.yml
        let local_config = PathBuf::from("githerd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/githerd/githerd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("githerd").join("githerd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.store
            .settings_path
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(herdstore::default_settings_path)
    }

    pub fn events_dir(&self) -> PathBuf {
        self.events.dir.as_deref().map(expand_tilde).unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("githerd")
                .join("events")
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.git.command_timeout_ms)
    }

    /// Repository paths listed in the config file
    pub fn repo_paths(&self) -> Vec<PathBuf> {
        self.repos.iter().map(|r| expand_tilde(&r.path)).collect()
    }

    /// Validated settings for the repository at `path`
    ///
    /// Starts from `defaults`, then applies the matching `repos` entry if any.
    /// The in-repository overlay is applied separately, once per cycle.
    pub fn repo_config(&self, path: &Path) -> Result<RepoConfig, ConfigError> {
        debug!(path = %path.display(), "Config::repo_config: called");
        let mut repo = RepoConfig {
            path: path.to_path_buf(),
            remote: self.defaults.remote.clone(),
            main_branch: self.defaults.main_branch.clone(),
            branch_prefix: self.defaults.branch_prefix.clone(),
            interval_seconds: self.sync.default_interval_seconds,
        };
        if let Some(entry) = self.repos.iter().find(|r| expand_tilde(&r.path) == path) {
            repo.apply(&entry.overrides);
        }
        repo.validate()?;
        Ok(repo)
    }
}

/// Git binary and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Path or name of the git executable
    pub binary: String,

    /// Bound on every git invocation in milliseconds
    #[serde(rename = "command-timeout-ms")]
    pub command_timeout_ms: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: "git".to_string(),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
        }
    }
}

/// Polling behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(rename = "default-interval-seconds")]
    pub default_interval_seconds: u64,

    /// Enabled flag assumed for branches with no stored flag
    #[serde(rename = "sync-new-branches-by-default")]
    pub sync_new_branches_by_default: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_interval_seconds: DEFAULT_INTERVAL_SECONDS,
            sync_new_branches_by_default: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(rename = "settings-path")]
    pub settings_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub dir: Option<PathBuf>,
}

/// Per-repo defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoDefaults {
    pub remote: String,

    #[serde(rename = "main-branch")]
    pub main_branch: String,

    #[serde(rename = "branch-prefix")]
    pub branch_prefix: String,
}

impl Default for RepoDefaults {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            main_branch: "main".to_string(),
            branch_prefix: "claude/".to_string(),
        }
    }
}

/// Optional per-repo settings, used both in `repos` entries and in the overlay file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoOverlay {
    pub remote: Option<String>,

    #[serde(rename = "main-branch")]
    pub main_branch: Option<String>,

    #[serde(rename = "branch-prefix")]
    pub branch_prefix: Option<String>,

    #[serde(rename = "interval-seconds")]
    pub interval_seconds: Option<u64>,
}

impl RepoOverlay {
    /// Read `<repo>/.githerd.yml`; a missing file is an empty overlay
    pub fn load(repo: &Path) -> Result<Self, ConfigError> {
        let path = repo.join(OVERLAY_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }
}

/// A repository entry in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoEntry {
    pub path: PathBuf,

    #[serde(flatten)]
    pub overrides: RepoOverlay,
}

/// Validated settings for one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub path: PathBuf,
    pub remote: String,
    pub main_branch: String,
    pub branch_prefix: String,
    pub interval_seconds: u64,
}

impl RepoConfig {
    /// Settings with built-in defaults, validated
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let defaults = RepoDefaults::default();
        Self {
            path: path.into(),
            remote: defaults.remote,
            main_branch: defaults.main_branch,
            branch_prefix: defaults.branch_prefix,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn apply(&mut self, overlay: &RepoOverlay) {
        if let Some(remote) = &overlay.remote {
            self.remote = remote.clone();
        }
        if let Some(main) = &overlay.main_branch {
            self.main_branch = main.clone();
        }
        if let Some(prefix) = &overlay.branch_prefix {
            self.branch_prefix = prefix.clone();
        }
        if let Some(interval) = overlay.interval_seconds {
            self.interval_seconds = interval;
        }
    }

    /// This config with the repository's overlay file applied and re-validated
    pub fn with_overlay(&self) -> Result<Self, ConfigError> {
        let overlay = RepoOverlay::load(&self.path)?;
        let mut repo = self.clone();
        repo.apply(&overlay);
        repo.validate()?;
        Ok(repo)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("remote", &self.remote)?;
        check_name("main-branch", &self.main_branch)?;
        if !self.branch_prefix.is_empty() {
            check_ref_text("branch-prefix", &self.branch_prefix)?;
        }
        if self.interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "interval-seconds",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn invalid(field: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(invalid(field, value, "must not be empty"));
    }
    check_ref_text(field, value)?;
    if value.ends_with(".lock") || value.ends_with('/') || value.ends_with('.') {
        return Err(invalid(field, value, "is not a valid ref name"));
    }
    Ok(())
}

fn check_ref_text(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with('-') {
        return Err(invalid(field, value, "must not start with '-'"));
    }
    if value.contains("..") || value.contains("//") || value.contains("@{") {
        return Err(invalid(field, value, "is not a valid ref name"));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid(field, value, "must not contain whitespace or control characters"));
    }
    if value.chars().any(|c| matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')) {
        return Err(invalid(field, value, "contains a character git forbids in ref names"));
    }
    Ok(())
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}
