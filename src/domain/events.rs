//! Execution events observed during an orchestration run.
//!
//! Events are a side channel: the engine emits them to observers but never
//! reads them back to make decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::ErrorKind;

/// A single immutable record of something that happened during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Step index (if applicable)
    pub step_index: Option<usize>,

    /// Capability the step invokes (if applicable)
    pub capability: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Correlation key format: "{run_id}:{step_index}:{arguments_hash}"
    pub correlation_key: String,

    /// Human-readable summary (no argument values)
    pub summary: String,

    /// Status of the step/run after this event
    pub status: StepStatus,

    /// Time taken in milliseconds (for finished steps)
    pub duration_ms: Option<u64>,

    /// Failure category if the step failed
    pub error_kind: Option<ErrorKind>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        event_type: EventType,
        correlation_key: String,
        summary: String,
        status: StepStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            step_index: None,
            capability: None,
            event_type,
            correlation_key,
            summary,
            status,
            duration_ms: None,
            error_kind: None,
            error: None,
        }
    }

    /// Attach the step this event concerns
    pub fn for_step(mut self, step_index: usize, capability: impl Into<String>) -> Self {
        self.step_index = Some(step_index);
        self.capability = Some(capability.into());
        self
    }

    /// Attach duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach error information
    pub fn with_error(mut self, kind: ErrorKind, error: String) -> Self {
        self.error_kind = Some(kind);
        self.error = Some(error);
        self
    }
}

/// Types of events emitted during orchestration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A request entered the engine
    RunStarted,

    /// The oracle's plan passed validation
    PlanAccepted,

    /// The oracle's plan was rejected; nothing will execute
    PlanRejected,

    /// A step began executing
    StepStarted,

    /// A step produced a value
    StepSucceeded,

    /// A step failed; the run continues
    StepFailed,

    /// Every step has a recorded result
    RunCompleted,
}

/// Lifecycle status of a step (or of the run as a whole)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started
    Pending,

    /// Currently executing
    Running,

    /// Finished with a value
    Succeeded,

    /// Finished with a failure
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl StepStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}
