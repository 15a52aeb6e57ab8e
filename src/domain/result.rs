//! Step outcomes and per-run execution state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Category of a step-scoped failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The step names a capability missing from the live catalog
    CapabilityNotFound,

    /// The capability returned an error
    CapabilityExecutionError,

    /// The step ran past its time budget
    BudgetExceeded,

    /// The run was cancelled while the step was in flight
    Aborted,

    /// A declared dependency had no recorded result
    DependencyNotReady,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapabilityNotFound => "capability_not_found",
            Self::CapabilityExecutionError => "capability_execution_error",
            Self::BudgetExceeded => "budget_exceeded",
            Self::Aborted => "aborted",
            Self::DependencyNotReady => "dependency_not_ready",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepOutcome {
    Success { value: Value },
    Failure { kind: ErrorKind, message: String },
}

/// The recorded result of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of the step in the plan
    pub step_index: usize,

    /// Capability the step named
    pub capability: String,

    /// What happened
    pub outcome: StepOutcome,

    /// Wall-clock time spent on the step
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(step_index: usize, capability: impl Into<String>, value: Value) -> Self {
        Self {
            step_index,
            capability: capability.into(),
            outcome: StepOutcome::Success { value },
            duration_ms: 0,
        }
    }

    pub fn failure(
        step_index: usize,
        capability: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step_index,
            capability: capability.into(),
            outcome: StepOutcome::Failure {
                kind,
                message: message.into(),
            },
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StepOutcome::Success { .. })
    }

    /// Failure category, if the step failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            StepOutcome::Success { .. } => None,
            StepOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Value handed to steps that depend on this one
    ///
    /// A failed step hands over a placeholder describing the failure so the
    /// dependent capability can decide what to do with it.
    pub fn dependency_value(&self) -> Value {
        match &self.outcome {
            StepOutcome::Success { value } => value.clone(),
            StepOutcome::Failure { kind, message } => json!({
                "error": {
                    "step_index": self.step_index,
                    "kind": kind,
                    "message": message,
                }
            }),
        }
    }
}

/// Results recorded so far in one plan run
///
/// Owned by a single run and never shared between runs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    results: BTreeMap<usize, StepResult>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step result, keyed by its step index
    pub fn record(&mut self, result: StepResult) {
        self.results.insert(result.step_index, result);
    }

    pub fn get(&self, step_index: usize) -> Option<&StepResult> {
        self.results.get(&step_index)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results in step order
    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.results.values()
    }

    pub fn succeeded(&self) -> usize {
        self.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Consume the state, yielding results in step order
    pub fn into_results(self) -> Vec<StepResult> {
        self.results.into_values().collect()
    }
}
