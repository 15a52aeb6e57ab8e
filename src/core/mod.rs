//! Core orchestration logic.
//!
//! This module contains:
//! - Catalog: Read-only capability registry
//! - Concurrency: Bounded execution of independent tasks
//! - Budget: Deadline and cancellation racing for one task
//! - Planner: Plan generation and validation
//! - Executor: Sequential step execution
//! - Aggregator: Synthesis of step outcomes
//! - Observer/EventLog: Optional execution observers
//! - Orchestrator: Main engine

pub mod aggregator;
pub mod budget;
pub mod catalog;
pub mod concurrency;
pub mod event_log;
pub mod executor;
pub mod observer;
pub mod orchestrator;
pub mod planner;

// Re-export commonly used types
pub use aggregator::{ResultAggregator, Synthesis};
pub use budget::{with_budget, Budget, BudgetError};
pub use catalog::{
    Capability, CapabilityArgs, CapabilityCatalog, CapabilityDescriptor, CatalogBuilder,
    CatalogError, FnCapability,
};
pub use concurrency::{effective_limit, run_with_concurrency_limit, Settled};
pub use event_log::{correlation_key, hash_arguments, EventLog};
pub use executor::StepExecutor;
pub use observer::{ExecutionObserver, Observers, TracingObserver};
pub use orchestrator::{Orchestration, Orchestrator};
pub use planner::{
    validate_candidate, GeneratedPlan, PlanCandidate, PlanError, PlanGenerator, PlanWarning,
    ReasoningOracle,
};
