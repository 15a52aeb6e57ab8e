//! Plans produced by the reasoning oracle.
//!
//! A plan is an arena of steps. Dependencies are integer back-references into
//! that arena and must always point at an earlier step.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// An ordered, immutable execution plan for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Why the oracle chose these steps
    pub reasoning: String,

    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Plan {
    /// Create a plan from reasoning and steps
    pub fn new(reasoning: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            reasoning: reasoning.into(),
            steps,
        }
    }

    /// Validate the structural invariants of the plan
    ///
    /// Plans produced by [`crate::core::PlanGenerator`] already satisfy these;
    /// this is for plans assembled in code or loaded from elsewhere.
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        if self.reasoning.trim().is_empty() {
            return Err(PlanValidationError::EmptyReasoning);
        }

        if self.steps.is_empty() {
            return Err(PlanValidationError::EmptySteps);
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.capability.trim().is_empty() {
                return Err(PlanValidationError::EmptyCapability { step: index });
            }
            check_dependencies(index, step.dependencies.iter().copied())?;
        }

        Ok(())
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Reject self and forward references for the step at `index`
pub(crate) fn check_dependencies(
    index: usize,
    dependencies: impl IntoIterator<Item = usize>,
) -> Result<(), PlanValidationError> {
    for dependency in dependencies {
        if dependency == index {
            return Err(PlanValidationError::SelfReference { step: index });
        }
        if dependency > index {
            return Err(PlanValidationError::ForwardReference {
                step: index,
                dependency,
            });
        }
    }
    Ok(())
}

/// One planned capability invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Name of the capability to invoke
    pub capability: String,

    /// User-supplied arguments, passed through untouched
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// Indices of earlier steps whose results this step consumes
    #[serde(default)]
    pub dependencies: BTreeSet<usize>,

    /// What this step contributes to the answer
    pub purpose: String,

    /// Override for the engine's default step budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_ms: Option<u64>,
}

impl Step {
    /// Create a step with no arguments and no dependencies
    pub fn new(capability: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            arguments: Map::new(),
            dependencies: BTreeSet::new(),
            purpose: purpose.into(),
            budget_ms: None,
        }
    }

    /// Set a single argument
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Declare a dependency on an earlier step
    pub fn depends_on(mut self, index: usize) -> Self {
        self.dependencies.insert(index);
        self
    }

    /// Set a per-step budget
    pub fn with_budget_ms(mut self, budget_ms: u64) -> Self {
        self.budget_ms = Some(budget_ms);
        self
    }

    /// Effective budget for this step
    pub fn budget(&self, default: Duration) -> Duration {
        self.budget_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

/// Structural problems that make a plan unusable
///
/// Any of these rejects the whole plan before a single step runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanValidationError {
    #[error("Plan candidate could not be parsed: {reason}")]
    Unparseable { reason: String },

    #[error("Plan candidate must be a JSON object")]
    NotAnObject,

    #[error("Plan is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Plan field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Plan reasoning cannot be empty")]
    EmptyReasoning,

    #[error("Plan must have at least one step")]
    EmptySteps,

    #[error("Step {step} must be a JSON object")]
    StepNotAnObject { step: usize },

    #[error("Step {step} is missing required field '{field}'")]
    StepMissingField { step: usize, field: &'static str },

    #[error("Step {step} field '{field}' must be {expected}")]
    StepWrongType {
        step: usize,
        field: &'static str,
        expected: &'static str,
    },

    #[error("Step {step} names an empty capability")]
    EmptyCapability { step: usize },

    #[error("Step {step} has invalid dependency index {value} (must be a non-negative integer)")]
    InvalidDependency { step: usize, value: String },

    #[error("Step {step} depends on itself")]
    SelfReference { step: usize },

    #[error("Step {step} depends on later step {dependency} (forward references not allowed)")]
    ForwardReference { step: usize, dependency: usize },
}
