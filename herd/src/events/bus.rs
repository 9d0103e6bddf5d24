//! Event Bus - central pub/sub system for GitHerd events
//!
//! The EventBus uses a tokio broadcast channel to deliver events to all
//! subscribers. Cycles emit, consumers (the JSONL logger, the CLI) subscribe.

use std::path::Path;

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::types::HerdEvent;
use crate::reconcile::{Action, ActionResult, Classification, CycleReport, Trigger};
use herdstore::Health;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Central event bus for reconciliation activity
pub struct EventBus {
    tx: broadcast::Sender<HerdEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: HerdEvent) {
        debug!(event_type = event.event_type(), repo = event.repo(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<HerdEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one cycle of one repository
    pub fn emitter_for(&self, repo: &Path, cycle_id: Uuid) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
            repo: repo.display().to_string(),
            cycle_id: cycle_id.to_string(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for a cycle to emit events without owning the bus
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<HerdEvent>,
    repo: String,
    cycle_id: String,
}

impl EventEmitter {
    pub fn cycle_id(&self) -> &str {
        &self.cycle_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: HerdEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn cycle_started(&self, trigger: Trigger) {
        self.emit(HerdEvent::CycleStarted {
            repo: self.repo.clone(),
            cycle_id: self.cycle_id.clone(),
            trigger,
        });
    }

    pub fn classified(&self, classification: &Classification) {
        self.emit(HerdEvent::Classified {
            repo: self.repo.clone(),
            cycle_id: self.cycle_id.clone(),
            classification: classification.clone(),
        });
    }

    pub fn action_chosen(&self, action: &Action) {
        self.emit(HerdEvent::ActionChosen {
            repo: self.repo.clone(),
            cycle_id: self.cycle_id.clone(),
            action: action.clone(),
        });
    }

    pub fn action_completed(&self, result: &ActionResult) {
        self.emit(HerdEvent::ActionCompleted {
            repo: self.repo.clone(),
            cycle_id: self.cycle_id.clone(),
            result: result.clone(),
        });
    }

    pub fn health_changed(&self, previous: Option<Health>, current: Health) {
        self.emit(HerdEvent::HealthChanged {
            repo: self.repo.clone(),
            cycle_id: self.cycle_id.clone(),
            previous,
            current,
        });
    }

    pub fn cycle_finished(&self, report: &CycleReport) {
        self.emit(HerdEvent::CycleFinished {
            repo: self.repo.clone(),
            cycle_id: self.cycle_id.clone(),
            report: Box::new(report.clone()),
        });
    }
}
