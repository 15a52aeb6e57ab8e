//! Command-line interface for toolplan.
//!
//! Provides commands for running requests, validating plans, inspecting the
//! capability catalog, and reading execution traces.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::{catalog_from_config, CommandOracle, FileOracle};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    EventLog, Orchestrator, PlanCandidate, ReasoningOracle, TracingObserver,
};
use crate::domain::Conversation;

/// toolplan - Plan-driven tool orchestration engine
#[derive(Parser, Debug)]
#[command(name = "toolplan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan and execute a request
    Run {
        /// The user request
        request: String,

        /// Use a plan file instead of the configured oracle
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Append execution events to this JSONL file
        /// (defaults to <home>/traces/<date>.jsonl)
        #[arg(short, long)]
        trace: Option<PathBuf>,

        /// Do not record execution events
        #[arg(long, conflicts_with = "trace")]
        no_trace: bool,

        /// Override the default per-step budget
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Print the full result as JSON instead of the synthesis
        #[arg(long)]
        json: bool,
    },

    /// Validate a plan file against the catalog without running it
    Validate {
        /// Plan file (JSON, YAML, or text with a fenced JSON block)
        plan: PathBuf,
    },

    /// List configured capabilities
    Catalog,

    /// Health-check every configured capability
    Health {
        /// Maximum concurrent checks (defaults to engine.concurrency_limit)
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<i64>,
    },

    /// Show events recorded in a trace file
    Trace {
        /// Trace file written by `run`
        path: PathBuf,

        /// Only show events for this run ID
        #[arg(short, long)]
        run: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                request,
                plan,
                trace,
                no_trace,
                budget_ms,
                json,
            } => run_request(&request, plan, trace, no_trace, budget_ms, json).await,
            Commands::Validate { plan } => validate_plan(plan).await,
            Commands::Catalog => show_catalog(),
            Commands::Health { limit } => health_check(limit).await,
            Commands::Trace { path, run } => show_trace(path, run).await,
            Commands::Config => show_config(),
        }
    }
}

/// Plan, execute and print the synthesis for one request
async fn run_request(
    request: &str,
    plan: Option<PathBuf>,
    trace: Option<PathBuf>,
    no_trace: bool,
    budget_ms: Option<u64>,
    as_json: bool,
) -> Result<()> {
    if request.trim().is_empty() {
        anyhow::bail!("Request is empty");
    }

    let config = config::config()?;
    let catalog = Arc::new(catalog_from_config(&config.capabilities)?);
    let oracle = select_oracle(config, plan)?;

    let mut settings = config.engine.clone();
    if let Some(budget_ms) = budget_ms {
        settings.step_budget_ms = budget_ms;
    }

    let mut orchestrator = Orchestrator::with_settings(catalog, oracle, &settings)
        .with_observer(Arc::new(TracingObserver));
    let trace_path = select_trace_path(config, trace, no_trace, Utc::now().date_naive());
    if let Some(path) = &trace_path {
        orchestrator = orchestrator.with_observer(Arc::new(EventLog::open(path).await?));
    }

    // Ctrl-C stops waiting on the current step; remaining steps record Aborted
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let conversation = Conversation::from_request(request);
    let orchestration = orchestrator.orchestrate(&conversation, Some(&cancel)).await?;

    if as_json {
        let output = json!({
            "run_id": orchestration.run_id,
            "plan": orchestration.plan,
            "warnings": orchestration.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            "results": orchestration.results,
            "synthesis": orchestration.synthesis,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", orchestration.synthesis);
    }

    eprintln!(
        "\n[Run {} finished: {} succeeded, {} failed]",
        orchestration.run_id, orchestration.synthesis.succeeded, orchestration.synthesis.failed
    );
    if let Some(path) = trace_path {
        eprintln!("[Trace: toolplan trace {} --run {}]", path.display(), orchestration.run_id);
    }

    Ok(())
}

/// Explicit path, else the daily file under the traces directory
fn select_trace_path(
    config: &ResolvedConfig,
    explicit: Option<PathBuf>,
    disabled: bool,
    today: NaiveDate,
) -> Option<PathBuf> {
    if disabled {
        return None;
    }
    Some(explicit.unwrap_or_else(|| config.default_trace_path(today)))
}

fn select_oracle(config: &ResolvedConfig, plan: Option<PathBuf>) -> Result<Arc<dyn ReasoningOracle>> {
    if let Some(path) = plan {
        return Ok(Arc::new(FileOracle::new(path)));
    }

    match &config.oracle {
        Some(oracle) => Ok(Arc::new(CommandOracle::new(oracle.clone()))),
        None => anyhow::bail!(
            "No oracle configured. Add an `oracle` section to .toolplan/config.yaml or pass --plan <file>"
        ),
    }
}

/// Validate a plan file and print its structure
async fn validate_plan(path: PathBuf) -> Result<()> {
    let config = config::config()?;
    let catalog = catalog_from_config(&config.capabilities)?;

    let candidate: PlanCandidate = FileOracle::new(&path).load()?;
    let value = candidate.into_json()?;
    let generated = crate::core::validate_candidate(value, &catalog.describe())
        .with_context(|| format!("Plan {} is invalid", path.display()))?;

    println!("Plan: {}", path.display());
    println!("Reasoning: {}", generated.plan.reasoning);
    println!("\n{:<6} {:<20} {:<12} PURPOSE", "STEP", "CAPABILITY", "DEPENDS ON");
    println!("{}", "-".repeat(75));

    for (index, step) in generated.plan.steps.iter().enumerate() {
        let dependencies = step
            .dependencies
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<6} {:<20} {:<12} {}",
            index,
            step.capability,
            if dependencies.is_empty() { "-".to_string() } else { dependencies },
            step.purpose
        );
    }

    if !generated.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &generated.warnings {
            println!("  {}", warning);
        }
    }

    Ok(())
}

/// List configured capabilities
fn show_catalog() -> Result<()> {
    let config = config::config()?;
    let catalog = catalog_from_config(&config.capabilities)?;

    if catalog.is_empty() {
        println!("No capabilities configured");
        return Ok(());
    }

    for descriptor in catalog.describe() {
        println!("{}", descriptor.name);
        println!("  {}", descriptor.description);
        println!("  parameters: {}", descriptor.parameters);
    }

    Ok(())
}

/// Health-check every capability concurrently
async fn health_check(limit: Option<i64>) -> Result<()> {
    let config = config::config()?;
    let catalog = catalog_from_config(&config.capabilities)?;
    let limit = limit.unwrap_or(config.engine.concurrency_limit);

    let report = catalog.health_check_all(limit).await;
    let mut unhealthy = 0;

    for (name, result) in &report {
        match result {
            Ok(()) => println!("{:<24} ok", name),
            Err(e) => {
                unhealthy += 1;
                println!("{:<24} FAILED: {:#}", name, e);
            }
        }
    }

    if unhealthy > 0 {
        anyhow::bail!("{} of {} capabilities unhealthy", unhealthy, report.len());
    }

    Ok(())
}

/// Print events from a trace file
async fn show_trace(path: PathBuf, run: Option<String>) -> Result<()> {
    let log = EventLog::open(path).await?;

    let events = match run {
        Some(run_id_str) => {
            let run_id = Uuid::parse_str(&run_id_str)
                .with_context(|| format!("Invalid run ID: {}", run_id_str))?;
            log.events_for_run(run_id).await?
        }
        None => log.replay().await?,
    };

    if events.is_empty() {
        println!("No events found");
        return Ok(());
    }

    println!("{:<26} {:<38} {:<16} {:<6} SUMMARY", "TIME", "RUN ID", "EVENT", "STEP");
    println!("{}", "-".repeat(110));

    for event in events {
        let step = event
            .step_index
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<26} {:<38} {:<16} {:<6} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            event.run_id,
            format!("{:?}", event.event_type),
            step,
            event.summary
        );
        if let Some(error) = event.error {
            println!("{:<26} {:<38} {:<16} {:<6} error: {}", "", "", "", "", error);
        }
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("Config file: {}", match &config.config_file {
        Some(path) => path.display().to_string(),
        None => "(none, using defaults)".to_string(),
    });
    println!("Home: {}", config.home.display());
    println!("Traces: {}", config.traces_dir().display());
    println!("\nEngine:");
    println!("  step_budget_ms: {}", config.engine.step_budget_ms);
    println!("  preview_chars: {}", config.engine.preview_chars);
    println!("  concurrency_limit: {}", config.engine.concurrency_limit);
    println!("\nOracle: {}", match &config.oracle {
        Some(oracle) => format!("{} {}", oracle.command, oracle.args.join(" ")),
        None => "(not configured)".to_string(),
    });
    println!("Capabilities: {}", config.capabilities.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "toolplan",
            "run",
            "museums in Paris",
            "--plan",
            "plan.yaml",
            "--budget-ms",
            "250",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                request,
                plan,
                budget_ms,
                json,
                ..
            } => {
                assert_eq!(request, "museums in Paris");
                assert_eq!(plan, Some(PathBuf::from("plan.yaml")));
                assert_eq!(budget_ms, Some(250));
                assert!(!json);
            }
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_accepts_negative_limit() {
        let cli = Cli::try_parse_from(["toolplan", "health", "--limit", "-2"]).unwrap();
        assert!(matches!(cli.command, Commands::Health { limit: Some(-2) }));
    }

    fn bare_config() -> ResolvedConfig {
        ResolvedConfig {
            home: PathBuf::from("/tmp/.toolplan"),
            config_file: None,
            engine: EngineSettings::default(),
            oracle: None,
            capabilities: Vec::new(),
        }
    }

    #[test]
    fn test_run_traces_to_home_by_default() {
        let config = bare_config();
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();

        assert_eq!(
            select_trace_path(&config, None, false, today),
            Some(PathBuf::from("/tmp/.toolplan/traces/2026-10-17.jsonl"))
        );
        assert_eq!(
            select_trace_path(&config, Some(PathBuf::from("run.jsonl")), false, today),
            Some(PathBuf::from("run.jsonl"))
        );
        assert_eq!(select_trace_path(&config, None, true, today), None);
    }

    #[test]
    fn test_no_trace_conflicts_with_trace() {
        let cli = Cli::try_parse_from(["toolplan", "run", "hi", "--no-trace"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { no_trace: true, .. }));

        let result =
            Cli::try_parse_from(["toolplan", "run", "hi", "--no-trace", "--trace", "t.jsonl"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_oracle_required_without_plan() {
        let config = bare_config();

        assert!(select_oracle(&config, None).is_err());
        let oracle = select_oracle(&config, Some(PathBuf::from("plan.json"))).unwrap();
        assert_eq!(oracle.name(), "file:plan.json");
    }
}
