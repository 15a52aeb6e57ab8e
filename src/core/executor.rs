//! Sequential step execution with per-step failure isolation.
//!
//! Steps run strictly in index order. Each step moves
//! `Pending -> Running -> {Succeeded, Failed}` and its result is stored before
//! the next step starts, which is what makes index-based dependency resolution
//! sound without a ready-queue. A failed step never stops the plan.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    ErrorKind, Event, EventType, ExecutionState, Plan, Step, StepOutcome, StepResult, StepStatus,
};

use super::budget::{with_budget, Budget, BudgetError};
use super::catalog::{CapabilityArgs, CapabilityCatalog};
use super::event_log::correlation_key;
use super::observer::Observers;

/// Default time budget for one step
pub const DEFAULT_STEP_BUDGET: Duration = Duration::from_secs(30);

/// Runs validated plans against the live catalog
#[derive(Clone)]
pub struct StepExecutor {
    catalog: Arc<CapabilityCatalog>,
    step_budget: Duration,
    observers: Observers,
}

impl StepExecutor {
    pub fn new(catalog: Arc<CapabilityCatalog>) -> Self {
        Self {
            catalog,
            step_budget: DEFAULT_STEP_BUDGET,
            observers: Observers::new(),
        }
    }

    /// Default budget for steps that do not set their own
    pub fn with_step_budget(mut self, step_budget: Duration) -> Self {
        self.step_budget = step_budget;
        self
    }

    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn step_budget(&self) -> Duration {
        self.step_budget
    }

    /// Execute every step of `plan`, recording exactly one result per step
    ///
    /// `cancel` stops the engine waiting on in-flight work; steps after a
    /// cancellation are still attempted and record `Aborted` immediately.
    #[instrument(skip(self, plan, cancel), fields(steps = plan.len()))]
    pub async fn execute(
        &self,
        run_id: Uuid,
        plan: &Plan,
        cancel: Option<&CancellationToken>,
    ) -> ExecutionState {
        let mut state = ExecutionState::new();

        for (index, step) in plan.steps.iter().enumerate() {
            let result = self.execute_step(run_id, index, step, &state, cancel).await;
            state.record(result);
        }

        state
    }

    async fn execute_step(
        &self,
        run_id: Uuid,
        index: usize,
        step: &Step,
        state: &ExecutionState,
        cancel: Option<&CancellationToken>,
    ) -> StepResult {
        let key = correlation_key(run_id, index, &Value::Object(step.arguments.clone()));
        let started = Instant::now();

        self.observers
            .emit(
                Event::new(
                    run_id,
                    EventType::StepStarted,
                    key.clone(),
                    format!("Step {} ({}) started: {}", index, step.capability, step.purpose),
                    StepStatus::Running,
                )
                .for_step(index, &step.capability),
            )
            .await;

        let result = self
            .run_step(index, step, state, cancel)
            .await
            .with_duration(started.elapsed().as_millis() as u64);

        self.record_finish(run_id, key, step, &result).await;
        result
    }

    async fn run_step(
        &self,
        index: usize,
        step: &Step,
        state: &ExecutionState,
        cancel: Option<&CancellationToken>,
    ) -> StepResult {
        let dependency_results = match resolve_dependencies(step, state) {
            Ok(values) => values,
            Err(missing) => {
                return StepResult::failure(
                    index,
                    &step.capability,
                    ErrorKind::DependencyNotReady,
                    format!("Dependency step {} has no recorded result", missing),
                );
            }
        };
        debug!(step = index, dependencies = dependency_results.len(), "Dependencies resolved");

        let Some(capability) = self.catalog.get(&step.capability) else {
            return StepResult::failure(
                index,
                &step.capability,
                ErrorKind::CapabilityNotFound,
                format!("Capability '{}' is not registered", step.capability),
            );
        };

        let args = CapabilityArgs::new(step.arguments.clone(), dependency_results);

        let mut budget = Budget::new(step.budget(self.step_budget));
        if let Some(token) = cancel {
            budget = budget.with_cancel(token.clone());
        }

        match with_budget(&budget, capability.invoke(args)).await {
            Ok(value) => StepResult::success(index, &step.capability, value),
            Err(BudgetError::Task(e)) => StepResult::failure(
                index,
                &step.capability,
                ErrorKind::CapabilityExecutionError,
                format!("{:#}", e),
            ),
            Err(e @ BudgetError::Exceeded { .. }) => {
                StepResult::failure(index, &step.capability, ErrorKind::BudgetExceeded, e.to_string())
            }
            Err(e @ BudgetError::Aborted) => {
                StepResult::failure(index, &step.capability, ErrorKind::Aborted, e.to_string())
            }
        }
    }

    async fn record_finish(&self, run_id: Uuid, key: String, step: &Step, result: &StepResult) {
        let index = result.step_index;
        let event = match &result.outcome {
            StepOutcome::Success { .. } => Event::new(
                run_id,
                EventType::StepSucceeded,
                key,
                format!("Step {} ({}) succeeded in {}ms", index, step.capability, result.duration_ms),
                StepStatus::Succeeded,
            ),
            StepOutcome::Failure { kind, message } => {
                warn!(step = index, capability = %step.capability, %kind, error = %message, "Step failed, continuing");
                Event::new(
                    run_id,
                    EventType::StepFailed,
                    key,
                    format!("Step {} ({}) failed: {}", index, step.capability, kind),
                    StepStatus::Failed,
                )
                .with_error(*kind, message.clone())
            }
        };

        self.observers
            .emit(
                event
                    .for_step(index, &step.capability)
                    .with_duration(result.duration_ms),
            )
            .await;
    }
}

/// Collect dependency values in ascending step order
///
/// Returns the first missing index if any dependency has no result yet.
fn resolve_dependencies(step: &Step, state: &ExecutionState) -> Result<Vec<Value>, usize> {
    step.dependencies
        .iter()
        .map(|&d| state.get(d).map(StepResult::dependency_value).ok_or(d))
        .collect()
}
