//! Event Bus for reconciliation observability
//!
//! Every cycle reports what it saw and did through this bus. Consumers (the
//! JSONL logger, the CLI waiting on a report) subscribe.
//!
//! ```text
//!   RepoWorker / Reconciler ──emit──► EventBus (tokio broadcast)
//!                                        │
//!                        ┌───────────────┴───────────────┐
//!                        ▼                               ▼
//!                 EventLogger                       CLI subscribers
//!         <events-dir>/<repo>/events.jsonl
//! ```
//!
//! Per cycle: `CycleStarted`, `Classified`, `ActionChosen`, `ActionCompleted`,
//! `HealthChanged` (only when health changes) and `CycleFinished`.

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use logger::{EventLogger, read_all_events, read_repo_events, repo_slug, spawn_event_logger};
pub use types::{EventLogEntry, HerdEvent};
