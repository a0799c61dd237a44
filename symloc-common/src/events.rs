//! Evaluation event types and EventBus
//!
//! Progress of a batch run is broadcast so the CLI (or any other observer)
//! can report it without the orchestrator knowing who listens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{ErrorKind, EvaluationMode, OrganAccuracyClass};

/// Evaluation events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EvalEvent {
    /// Batch accepted and reports loaded
    BatchStarted {
        batch_id: Uuid,
        report_count: usize,
        unit_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Unit moved to IN_FLIGHT
    UnitStarted {
        batch_id: Uuid,
        symptom_id: String,
        provider: String,
        mode: EvaluationMode,
        timestamp: DateTime<Utc>,
    },

    /// Unit reached SCORED
    UnitScored {
        batch_id: Uuid,
        symptom_id: String,
        provider: String,
        mode: EvaluationMode,
        organ_accuracy_class: OrganAccuracyClass,
        overall_score: f64,
        timestamp: DateTime<Utc>,
    },

    /// Unit reached FAILED
    UnitFailed {
        batch_id: Uuid,
        symptom_id: String,
        provider: String,
        mode: EvaluationMode,
        kind: ErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Every unit of a report is terminal and the report was aggregated
    ReportCompleted {
        batch_id: Uuid,
        report_id: u32,
        scored_units: usize,
        failed_units: usize,
        timestamp: DateTime<Utc>,
    },

    /// Batch finished (normally or by cancellation)
    BatchCompleted {
        batch_id: Uuid,
        cancelled: bool,
        scored_units: usize,
        failed_units: usize,
        timestamp: DateTime<Utc>,
    },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// see a lag error instead of stalling producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EvalEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EvalEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: EvalEvent) -> Result<usize, broadcast::error::SendError<EvalEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EvalEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
