//! Settings document and the stores that persist it

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;

/// Repository health as last evaluated by a reconciliation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    #[default]
    Ok,
    Errored,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

impl FromStr for Health {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(Self::Ok),
            "errored" | "error" => Ok(Self::Errored),
            _ => Err(format!("Unknown health: {}. Use: ok or errored", s)),
        }
    }
}

/// The whole persisted document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Known repositories, in the order they were added
    pub repos: Vec<String>,

    /// Repositories that are remembered but not polled
    pub hidden_repos: Vec<String>,

    /// repo -> branch -> enabled
    pub branch_enabled: BTreeMap<String, BTreeMap<String, bool>>,

    /// repo -> last health
    pub health: BTreeMap<String, Health>,

    /// repo -> whether timer-driven cycles run (absent means yes)
    pub polling: BTreeMap<String, bool>,
}

/// Key used for a repository inside the settings document
pub fn repo_key(repo: &Path) -> String {
    repo.to_string_lossy().into_owned()
}

/// Get/set capability over the settings document
///
/// Implementors only provide `load` and `update`; every accessor is built on
/// top of those two so that all stores share the same semantics.
pub trait SettingsStore: Send + Sync {
    /// Read the current document
    fn load(&self) -> Result<Settings, StoreError>;

    /// Apply a mutation to the document and persist it
    fn update(&self, apply: &mut dyn FnMut(&mut Settings)) -> Result<(), StoreError>;

    fn branch_enabled(&self, repo: &Path, branch: &str) -> Result<Option<bool>, StoreError> {
        let settings = self.load()?;
        Ok(settings
            .branch_enabled
            .get(&repo_key(repo))
            .and_then(|branches| branches.get(branch))
            .copied())
    }

    fn set_branch_enabled(&self, repo: &Path, branch: &str, enabled: bool) -> Result<(), StoreError> {
        debug!(repo = %repo.display(), branch, enabled, "set_branch_enabled: called");
        let key = repo_key(repo);
        self.update(&mut |settings| {
            settings
                .branch_enabled
                .entry(key.clone())
                .or_default()
                .insert(branch.to_string(), enabled);
        })
    }

    /// All stored branch flags for a repository
    fn branch_flags(&self, repo: &Path) -> Result<BTreeMap<String, bool>, StoreError> {
        let settings = self.load()?;
        Ok(settings.branch_enabled.get(&repo_key(repo)).cloned().unwrap_or_default())
    }

    fn health(&self, repo: &Path) -> Result<Option<Health>, StoreError> {
        Ok(self.load()?.health.get(&repo_key(repo)).copied())
    }

    fn set_health(&self, repo: &Path, health: Health) -> Result<(), StoreError> {
        let key = repo_key(repo);
        self.update(&mut |settings| {
            settings.health.insert(key.clone(), health);
        })
    }

    fn repos(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self.load()?.repos.iter().map(PathBuf::from).collect())
    }

    /// Add a repository; returns false if it was already known
    fn add_repo(&self, repo: &Path) -> Result<bool, StoreError> {
        let key = repo_key(repo);
        let mut added = false;
        self.update(&mut |settings| {
            if !settings.repos.contains(&key) {
                settings.repos.push(key.clone());
                added = true;
            }
        })?;
        Ok(added)
    }

    /// Forget a repository and everything stored for it; returns false if unknown
    fn remove_repo(&self, repo: &Path) -> Result<bool, StoreError> {
        let key = repo_key(repo);
        let mut removed = false;
        self.update(&mut |settings| {
            let before = settings.repos.len();
            settings.repos.retain(|r| r != &key);
            removed = settings.repos.len() != before;
            settings.hidden_repos.retain(|r| r != &key);
            settings.branch_enabled.remove(&key);
            settings.health.remove(&key);
            settings.polling.remove(&key);
        })?;
        Ok(removed)
    }

    fn hidden_repos(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self.load()?.hidden_repos.iter().map(PathBuf::from).collect())
    }

    fn set_hidden(&self, repo: &Path, hidden: bool) -> Result<(), StoreError> {
        let key = repo_key(repo);
        self.update(&mut |settings| {
            settings.hidden_repos.retain(|r| r != &key);
            if hidden {
                settings.hidden_repos.push(key.clone());
            }
        })
    }

    /// Whether the timer drives cycles for this repository
    fn polling(&self, repo: &Path) -> Result<bool, StoreError> {
        Ok(self.load()?.polling.get(&repo_key(repo)).copied().unwrap_or(true))
    }

    fn set_polling(&self, repo: &Path, enabled: bool) -> Result<(), StoreError> {
        debug!(repo = %repo.display(), enabled, "set_polling: called");
        let key = repo_key(repo);
        self.update(&mut |settings| {
            if enabled {
                settings.polling.remove(&key);
            } else {
                settings.polling.insert(key.clone(), false);
            }
        })
    }

    /// Known repositories that are not hidden
    fn visible_repos(&self) -> Result<Vec<PathBuf>, StoreError> {
        let settings = self.load()?;
        Ok(settings
            .repos
            .iter()
            .filter(|r| !settings.hidden_repos.contains(r))
            .map(PathBuf::from)
            .collect())
    }
}

/// JSON file store shared safely between processes
///
/// Every operation re-reads the file so that a CLI toggling a branch flag is
/// seen by a running scheduler on its next cycle. Writes take an exclusive
/// advisory lock and replace the file through a rename.
pub struct JsonStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonStore {
    /// Open (creating the parent directory if needed) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut lock_name = path.as_os_str().to_os_string();
        lock_name.push(".lock");
        debug!(path = %path.display(), "JsonStore::open");
        Ok(Self {
            path,
            lock_path: PathBuf::from(lock_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<fs::File, StoreError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))
    }

    fn read_unlocked(&self) -> Result<Settings, StoreError> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_unlocked(&self, settings: &Settings) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(settings)?;
        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        file.write_all(json.as_bytes()).map_err(|e| StoreError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }
}

impl SettingsStore for JsonStore {
    fn load(&self) -> Result<Settings, StoreError> {
        let lock = self.lock_file()?;
        FileExt::lock_shared(&lock).map_err(|e| StoreError::io(&self.lock_path, e))?;
        let result = self.read_unlocked();
        let _ = FileExt::unlock(&lock);
        result
    }

    fn update(&self, apply: &mut dyn FnMut(&mut Settings)) -> Result<(), StoreError> {
        let lock = self.lock_file()?;
        FileExt::lock_exclusive(&lock).map_err(|e| StoreError::io(&self.lock_path, e))?;
        let result = self.read_unlocked().and_then(|mut settings| {
            apply(&mut settings);
            self.write_unlocked(&settings)
        });
        let _ = FileExt::unlock(&lock);
        if result.is_ok() {
            info!(path = %self.path.display(), "Settings saved");
        }
        result
    }
}

/// In-process store, used by tests and one-shot commands without persistence
#[derive(Default)]
pub struct MemoryStore {
    settings: Mutex<Settings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Settings, StoreError> {
        self.settings.lock().map(|s| s.clone()).map_err(|_| StoreError::Poisoned)
    }

    fn update(&self, apply: &mut dyn FnMut(&mut Settings)) -> Result<(), StoreError> {
        let mut settings = self.settings.lock().map_err(|_| StoreError::Poisoned)?;
        apply(&mut settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> PathBuf {
        PathBuf::from("/work/project")
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::open(temp.path().join("settings.json")).unwrap();

        let settings = store.load().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(store.branch_enabled(&repo(), "claude/x").unwrap(), None);
    }

    #[test]
    fn test_branch_flags_persist_across_instances() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("settings.json");

        let store = JsonStore::open(&path).unwrap();
        store.set_branch_enabled(&repo(), "claude/x", true).unwrap();
        store.set_branch_enabled(&repo(), "claude/y", false).unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        assert_eq!(reopened.branch_enabled(&repo(), "claude/x").unwrap(), Some(true));
        assert_eq!(reopened.branch_enabled(&repo(), "claude/y").unwrap(), Some(false));
        assert_eq!(reopened.branch_flags(&repo()).unwrap().len(), 2);
    }

    #[test]
    fn test_health_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::open(temp.path().join("settings.json")).unwrap();

        assert_eq!(store.health(&repo()).unwrap(), None);
        store.set_health(&repo(), Health::Errored).unwrap();
        assert_eq!(store.health(&repo()).unwrap(), Some(Health::Errored));

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("\"errored\""));
    }

    #[test]
    fn test_add_repo_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.add_repo(&repo()).unwrap());
        assert!(!store.add_repo(&repo()).unwrap());
        assert_eq!(store.repos().unwrap(), vec![repo()]);
    }

    #[test]
    fn test_remove_repo_forgets_everything() {
        let store = MemoryStore::new();
        store.add_repo(&repo()).unwrap();
        store.set_branch_enabled(&repo(), "claude/x", true).unwrap();
        store.set_health(&repo(), Health::Errored).unwrap();
        store.set_hidden(&repo(), true).unwrap();
        store.set_polling(&repo(), false).unwrap();

        assert!(store.remove_repo(&repo()).unwrap());
        let settings = store.load().unwrap();
        assert!(settings.repos.is_empty());
        assert!(settings.hidden_repos.is_empty());
        assert!(settings.branch_enabled.is_empty());
        assert!(settings.health.is_empty());
        assert!(settings.polling.is_empty());
        assert!(!store.remove_repo(&repo()).unwrap());
    }

    #[test]
    fn test_hidden_repos_are_not_visible() {
        let store = MemoryStore::new();
        let other = PathBuf::from("/work/other");
        store.add_repo(&repo()).unwrap();
        store.add_repo(&other).unwrap();

        store.set_hidden(&other, true).unwrap();
        assert_eq!(store.visible_repos().unwrap(), vec![repo()]);

        store.set_hidden(&other, false).unwrap();
        assert_eq!(store.visible_repos().unwrap().len(), 2);
        assert!(store.hidden_repos().unwrap().is_empty());
    }

    #[test]
    fn test_polling_defaults_on() {
        let store = MemoryStore::new();
        assert!(store.polling(&repo()).unwrap());
        store.set_polling(&repo(), false).unwrap();
        assert!(!store.polling(&repo()).unwrap());
        store.set_polling(&repo(), true).unwrap();
        assert!(store.polling(&repo()).unwrap());
        assert!(store.load().unwrap().polling.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonStore::open(&path).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_health_from_str() {
        assert_eq!("ok".parse::<Health>(), Ok(Health::Ok));
        assert_eq!("ERRORED".parse::<Health>(), Ok(Health::Errored));
        assert!("broken".parse::<Health>().is_err());
    }
}
