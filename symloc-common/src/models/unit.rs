//! Unit-of-work state machine
//!
//! One unit is one (report, symptom, provider, mode) tuple:
//! PENDING → IN_FLIGHT → {SCORED, FAILED}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::metrics::{ErrorKind, SymptomMetrics};
use super::prediction::{EvaluationMode, Prediction};

/// Unit-of-work state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Queued, not yet started
    Pending,
    /// Waiting on an external call
    InFlight,
    /// Metrics computed
    Scored,
    /// Ended with a recorded error kind
    Failed,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Scored | UnitState::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: UnitState) -> bool {
        matches!(
            (self, next),
            (UnitState::Pending, UnitState::InFlight)
                | (UnitState::Pending, UnitState::Failed)
                | (UnitState::InFlight, UnitState::Scored)
                | (UnitState::InFlight, UnitState::Failed)
        )
    }
}

/// Identity of a unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub report_id: u32,
    pub symptom_id: String,
    pub provider: String,
    pub mode: EvaluationMode,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.symptom_id, self.provider, self.mode)
    }
}

/// State transition event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTransition {
    pub old_state: UnitState,
    pub new_state: UnitState,
    pub transitioned_at: DateTime<Utc>,
}

/// Error recorded on a failed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Unit of work with its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub key: UnitKey,
    pub state: UnitState,

    /// Prediction calls made, including retries
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SymptomMetrics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,

    pub created_at: DateTime<Utc>,

    /// Set when a terminal state is reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl UnitRecord {
    pub fn new(key: UnitKey) -> Self {
        Self {
            key,
            state: UnitState::Pending,
            attempts: 0,
            prediction: None,
            metrics: None,
            error: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    ///
    /// Illegal transitions (anything out of a terminal state, or skipping
    /// IN_FLIGHT on the way to SCORED) leave the record unchanged and
    /// return `None`.
    pub fn transition_to(&mut self, new_state: UnitState) -> Option<UnitTransition> {
        if !self.state.can_transition_to(new_state) {
            tracing::warn!(
                unit = %self.key,
                from = ?self.state,
                to = ?new_state,
                "Ignoring illegal unit state transition"
            );
            return None;
        }

        let transition = UnitTransition {
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        Some(transition)
    }

    /// Record prediction and metrics, moving to SCORED
    pub fn mark_scored(&mut self, prediction: Prediction, metrics: SymptomMetrics) -> Option<UnitTransition> {
        let transition = self.transition_to(UnitState::Scored)?;
        self.prediction = Some(prediction);
        self.metrics = Some(metrics);
        Some(transition)
    }

    /// Record an error, moving to FAILED
    pub fn mark_failed(&mut self, kind: ErrorKind, message: impl Into<String>) -> Option<UnitTransition> {
        let transition = self.transition_to(UnitState::Failed)?;
        self.error = Some(UnitError {
            kind,
            message: message.into(),
        });
        Some(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
