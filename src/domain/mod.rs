//! Domain types for the toolplan engine.
//!
//! This module contains the core data structures:
//! - Conversation: Context passed to the oracle and the downstream consumer
//! - Plan: Steps and their dependency back-references
//! - Result: Step outcomes and per-run execution state
//! - Events: Observation records emitted while a run progresses

pub mod conversation;
pub mod events;
pub mod plan;
pub mod result;

// Re-export commonly used types
pub use conversation::{Conversation, Message, Role};
pub use events::{Event, EventType, StepStatus};
pub use plan::{Plan, PlanValidationError, Step};
pub use result::{ErrorKind, ExecutionState, StepOutcome, StepResult};
