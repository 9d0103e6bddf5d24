//! Event Logger - persists events to JSONL files
//!
//! The EventLogger subscribes to the EventBus and appends every event to a
//! per-repository JSONL file for history and `githerd logs`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, HerdEvent};

const EVENTS_FILE: &str = "events.jsonl";

/// Directory name used for a repository under the events directory
///
/// `/home/me/project` becomes `home-me-project-<hash>`. The readable part is
/// lossy, so the first 8 hex digits of the path's SHA-256 keep `/work/a-b`
/// and `/work/a/b` apart.
pub fn repo_slug(repo: &str) -> String {
    let slug: String = repo
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let mut collapsed = String::with_capacity(slug.len() + 9);
    for c in slug.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }
    if collapsed.is_empty() {
        collapsed.push_str("root");
    }
    let digest = hex::encode(Sha256::digest(repo.as_bytes()));
    format!("{}-{}", collapsed, &digest[..8])
}

/// Event logger that writes events to JSONL files
///
/// Events are written to `<events-dir>/<repo-slug>/events.jsonl`
pub struct EventLogger {
    events_dir: PathBuf,
    /// Open file writers per repository slug
    writers: HashMap<String, BufWriter<File>>,
}

impl EventLogger {
    pub fn new(events_dir: impl AsRef<Path>) -> Self {
        let events_dir = events_dir.as_ref().to_path_buf();
        debug!(?events_dir, "EventLogger::new: creating logger");
        Self {
            events_dir,
            writers: HashMap::new(),
        }
    }

    /// Append an event to its repository's log file
    pub fn write_event(&mut self, event: &HerdEvent) -> eyre::Result<()> {
        let slug = repo_slug(event.repo());
        debug!(%slug, event_type = event.event_type(), "EventLogger::write_event");

        let writer = match self.writers.entry(slug) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let repo_dir = self.events_dir.join(entry.key());
                fs::create_dir_all(&repo_dir)?;

                let log_path = repo_dir.join(EVENTS_FILE);
                debug!(?log_path, "EventLogger: opening log file");
                let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
                entry.insert(BufWriter::new(file))
            }
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Run the logger, consuming events from the bus until it closes
    ///
    /// This is meant to be spawned as a background task.
    pub async fn run(mut self, event_bus: Arc<EventBus>) {
        let rx = event_bus.subscribe();
        drop(event_bus);
        self.run_with(rx).await;
    }

    async fn run_with(&mut self, mut rx: broadcast::Receiver<HerdEvent>) {
        debug!("EventLogger::run: starting event logger");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(repo = event.repo(), error = %e, "EventLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (slug, mut writer) in self.writers.drain() {
            debug!(%slug, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read events logged for one repository
pub fn read_repo_events(events_dir: impl AsRef<Path>, repo: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = events_dir.as_ref().join(repo_slug(repo)).join(EVENTS_FILE);
    read_log(&log_path)
}

/// Read events logged for every repository, oldest first
pub fn read_all_events(events_dir: impl AsRef<Path>) -> eyre::Result<Vec<EventLogEntry>> {
    let events_dir = events_dir.as_ref();
    if !events_dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for dir in fs::read_dir(events_dir)? {
        let path = dir?.path().join(EVENTS_FILE);
        if path.exists() {
            entries.extend(read_log(&path)?);
        }
    }
    entries.sort_by_key(|e| e.timestamp);
    Ok(entries)
}

fn read_log(log_path: &Path) -> eyre::Result<Vec<EventLogEntry>> {
    debug!(?log_path, "read_log: reading log file");
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(log_path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_log: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_log: loaded entries");
    Ok(entries)
}

/// Spawn the event logger as a background task
///
/// The task ends once every sender of the bus has been dropped.
pub fn spawn_event_logger(event_bus: &EventBus, events_dir: impl AsRef<Path>) -> eyre::Result<tokio::task::JoinHandle<()>> {
    fs::create_dir_all(events_dir.as_ref())?;
    let mut logger = EventLogger::new(events_dir);
    let rx = event_bus.subscribe();
    Ok(tokio::spawn(async move {
        logger.run_with(rx).await;
    }))
}
