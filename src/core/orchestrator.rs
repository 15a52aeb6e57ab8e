//! Main orchestration engine.
//!
//! Coordinates plan generation, step execution and synthesis for one request
//! at a time. Each call owns its own execution state; concurrent calls share
//! only the read-only catalog and the observers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::adapters::SynthesisConsumer;
use crate::config::EngineSettings;
use crate::domain::{Conversation, Event, EventType, Plan, StepResult, StepStatus};

use super::aggregator::{ResultAggregator, Synthesis};
use super::catalog::CapabilityCatalog;
use super::concurrency::run_with_concurrency_limit;
use super::executor::StepExecutor;
use super::observer::{ExecutionObserver, Observers};
use super::planner::{GeneratedPlan, PlanError, PlanGenerator, PlanWarning, ReasoningOracle};

/// Everything one orchestration call produced
#[derive(Debug, Clone)]
pub struct Orchestration {
    pub run_id: Uuid,
    pub plan: Plan,
    pub warnings: Vec<PlanWarning>,
    pub results: Vec<StepResult>,
    pub synthesis: Synthesis,
}

/// The tool orchestration engine
#[derive(Clone)]
pub struct Orchestrator {
    catalog: Arc<CapabilityCatalog>,
    planner: PlanGenerator,
    executor: StepExecutor,
    aggregator: ResultAggregator,
    observers: Observers,
}

impl Orchestrator {
    /// Create an engine with default settings
    pub fn new(catalog: Arc<CapabilityCatalog>, oracle: Arc<dyn ReasoningOracle>) -> Self {
        Self::with_settings(catalog, oracle, &EngineSettings::default())
    }

    /// Create an engine from resolved settings
    pub fn with_settings(
        catalog: Arc<CapabilityCatalog>,
        oracle: Arc<dyn ReasoningOracle>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            executor: StepExecutor::new(catalog.clone()).with_step_budget(settings.step_budget()),
            catalog,
            planner: PlanGenerator::new(oracle),
            aggregator: ResultAggregator::new(settings.preview_chars),
            observers: Observers::new(),
        }
    }

    /// Attach an observer that sees every event from every run
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self.executor = self.executor.with_observers(self.observers.clone());
        self
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    /// Plan, execute and synthesize one request
    ///
    /// Fails only when no valid plan could be obtained, or when `cancel` fires
    /// while the oracle is still planning; in both cases no step has run. Once a plan is accepted every step gets a result, whatever
    /// happens to the others.
    #[instrument(skip_all, fields(oracle = %self.planner.oracle_name()))]
    pub async fn orchestrate(
        &self,
        conversation: &Conversation,
        cancel: Option<&CancellationToken>,
    ) -> Result<Orchestration, PlanError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting orchestration");

        self.emit(
            run_id,
            EventType::RunStarted,
            "start",
            format!("Run started with {} capabilities", self.catalog.len()),
            StepStatus::Running,
        )
        .await;

        let generated = match self.plan(conversation, cancel).await {
            Ok(generated) => generated,
            Err(e) => {
                error!(%run_id, error = %e, "Plan rejected, nothing executed");
                let mut event = Event::new(
                    run_id,
                    EventType::PlanRejected,
                    format!("{}:plan", run_id),
                    "Plan rejected".to_string(),
                    StepStatus::Failed,
                );
                event.error = Some(e.to_string());
                self.observers.emit(event).await;
                return Err(e);
            }
        };

        let plan = generated.plan;
        self.emit(
            run_id,
            EventType::PlanAccepted,
            "plan",
            format!(
                "Plan accepted: {} steps, {} warnings",
                plan.len(),
                generated.warnings.len()
            ),
            StepStatus::Running,
        )
        .await;

        let state = self.executor.execute(run_id, &plan, cancel).await;
        let synthesis = self.aggregator.aggregate(&plan, &state);

        info!(
            %run_id,
            succeeded = synthesis.succeeded,
            failed = synthesis.failed,
            "Orchestration completed"
        );
        self.emit(
            run_id,
            EventType::RunCompleted,
            "complete",
            format!(
                "Run completed: {} succeeded, {} failed",
                synthesis.succeeded, synthesis.failed
            ),
            StepStatus::Succeeded,
        )
        .await;

        Ok(Orchestration {
            run_id,
            plan,
            warnings: generated.warnings,
            results: state.into_results(),
            synthesis,
        })
    }

    /// Orchestrate independent requests with at most `limit` in flight
    ///
    /// Results are returned in the order of `conversations`.
    pub async fn orchestrate_many(
        &self,
        conversations: &[Conversation],
        limit: i64,
        cancel: Option<&CancellationToken>,
    ) -> Vec<Result<Orchestration, PlanError>> {
        let runs: Vec<_> = conversations
            .iter()
            .map(|conversation| self.orchestrate(conversation, cancel))
            .collect();

        run_with_concurrency_limit(limit, runs)
            .await
            .into_iter()
            .map(|settled| settled.into_result())
            .collect()
    }

    /// Orchestrate a request and hand the synthesis to the response writer
    pub async fn respond(
        &self,
        conversation: &Conversation,
        consumer: &dyn SynthesisConsumer,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let orchestration = self.orchestrate(conversation, cancel).await?;

        consumer
            .respond(conversation, &orchestration.synthesis)
            .await
            .with_context(|| format!("Response writer failed for run {}", orchestration.run_id))
    }

    /// Ask the planner, giving up as soon as `cancel` fires
    async fn plan(
        &self,
        conversation: &Conversation,
        cancel: Option<&CancellationToken>,
    ) -> Result<GeneratedPlan, PlanError> {
        let catalog = self.catalog.describe();
        let planning = self.planner.generate(conversation, &catalog);

        let Some(token) = cancel else {
            return planning.await;
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(PlanError::Aborted),
            generated = planning => generated,
        }
    }

    async fn emit(
        &self,
        run_id: Uuid,
        event_type: EventType,
        suffix: &str,
        summary: String,
        status: StepStatus,
    ) {
        self.observers
            .emit(Event::new(
                run_id,
                event_type,
                format!("{}:{}", run_id, suffix),
                summary,
                status,
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{CapabilityArgs, CapabilityDescriptor, FnCapability};
    use crate::core::observer::testing::RecordingObserver;
    use crate::core::planner::PlanCandidate;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FixedOracle(Value);

    #[async_trait]
    impl ReasoningOracle for FixedOracle {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate_plan(
            &self,
            _conversation: &Conversation,
            _catalog: &[CapabilityDescriptor],
        ) -> anyhow::Result<PlanCandidate> {
            Ok(PlanCandidate::Structured(self.0.clone()))
        }
    }

    fn catalog() -> Arc<CapabilityCatalog> {
        Arc::new(
            CapabilityCatalog::builder()
                .register(FnCapability::new("echo", "Echo", json!({}), |args: CapabilityArgs| async move {
                    Ok::<_, anyhow::Error>(Value::Object(args.arguments))
                }))
                .unwrap()
                .build(),
        )
    }

    #[tokio::test]
    async fn test_rejected_plan_emits_no_step_events() {
        let oracle = FixedOracle(json!({
            "reasoning": "bad",
            "steps": [{"capability": "echo", "purpose": "p", "dependencies": [0]}]
        }));
        let recorder = Arc::new(RecordingObserver::default());
        let orchestrator =
            Orchestrator::new(catalog(), Arc::new(oracle)).with_observer(recorder.clone());

        let result = orchestrator
            .orchestrate(&Conversation::from_request("hi"), None)
            .await;

        assert!(matches!(result, Err(PlanError::Validation(_))));
        assert_eq!(
            recorder.event_types(),
            vec![EventType::RunStarted, EventType::PlanRejected]
        );
    }

    #[tokio::test]
    async fn test_accepted_plan_event_sequence() {
        let oracle = FixedOracle(json!({
            "reasoning": "echo twice",
            "steps": [
                {"capability": "echo", "arguments": {"n": 1}, "purpose": "first"},
                {"capability": "echo", "arguments": {"n": 2}, "purpose": "second", "dependencies": [0]}
            ]
        }));
        let recorder = Arc::new(RecordingObserver::default());
        let orchestrator =
            Orchestrator::new(catalog(), Arc::new(oracle)).with_observer(recorder.clone());

        let orchestration = orchestrator
            .orchestrate(&Conversation::from_request("hi"), None)
            .await
            .unwrap();

        assert_eq!(orchestration.results.len(), 2);
        assert_eq!(orchestration.synthesis.succeeded, 2);
        assert_eq!(
            recorder.event_types(),
            vec![
                EventType::RunStarted,
                EventType::PlanAccepted,
                EventType::StepStarted,
                EventType::StepSucceeded,
                EventType::StepStarted,
                EventType::StepSucceeded,
                EventType::RunCompleted,
            ]
        );
    }
}
