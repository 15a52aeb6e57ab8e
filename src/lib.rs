//! toolplan - Plan-driven tool orchestration engine
//!
//! Given a request and a catalog of capabilities, toolplan asks a reasoning
//! oracle for a multi-step plan, validates its dependency structure, runs the
//! steps in order under time budgets, and synthesizes the outcomes into one
//! artifact for a downstream response writer.
//!
//! # Architecture
//!
//! - Plans are an arena of steps with integer back-references; a reference
//!   to the same or a later step rejects the whole plan before anything runs
//! - Steps execute strictly in index order; a failing step is recorded and the
//!   plan carries on
//! - Every capability call races its budget and an optional cancellation token
//! - Logging is an observer on the side, never the error channel
//!
//! # Modules
//!
//! - `adapters`: External collaborators (command capabilities, oracles)
//! - `core`: Engine (Catalog, Planner, Executor, Aggregator, Orchestrator)
//! - `domain`: Data structures (Plan, StepResult, Event)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a request with the configured oracle
//! toolplan run "museums near the Eiffel Tower"
//!
//! # Run a hand-written plan
//! toolplan run "museums in Paris" --plan plan.yaml --trace trace.jsonl
//!
//! # Check a plan without running it
//! toolplan validate plan.yaml
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{
    CapabilityCatalog, Orchestration, Orchestrator, PlanError, ReasoningOracle, Synthesis,
};
pub use domain::{Conversation, ErrorKind, ExecutionState, Plan, Step, StepOutcome, StepResult};
