//! Subprocess-backed capabilities and oracle.
//!
//! Input is written to the child's stdin as JSON and output is read from
//! stdout. Children are killed when their future is dropped, so a step that
//! runs out of budget does not leave the process behind.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{CapabilityConfig, OracleConfig};
use crate::core::{
    with_budget, Budget, BudgetError, Capability, CapabilityArgs, CapabilityDescriptor,
    PlanCandidate, ReasoningOracle,
};
use crate::domain::Conversation;

/// Run `program` with `args`, piping `input` to stdin, and return stdout
pub async fn run_command(program: &str, args: &[String], input: &[u8]) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn '{}'", program))?;

    // Feed stdin while stdout/stderr drain, or a filter blocks on a full pipe
    let stdin = child.stdin.take();
    let feed = async move {
        if let Some(mut stdin) = stdin {
            stdin.write_all(input).await?;
            // Dropping stdin signals EOF
        }
        Ok::<_, std::io::Error>(())
    };

    let (written, output) = tokio::join!(feed, child.wait_with_output());
    let output = output.with_context(|| format!("Failed to wait for '{}'", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        anyhow::bail!(
            "'{}' failed with exit code {}: {}",
            program,
            exit_code,
            stderr.trim()
        );
    }

    // A child that exits successfully without reading all input is fine
    if let Err(e) = written {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(e).with_context(|| format!("Failed to write to '{}' stdin", program));
        }
    }

    String::from_utf8(output.stdout).with_context(|| format!("'{}' output is not valid UTF-8", program))
}

/// Capability implemented by an external command
///
/// The command receives `{"arguments": {...}, "dependency_results": [...]}`
/// on stdin. JSON on stdout becomes the value; anything else is returned as a
/// string.
pub struct CommandCapability {
    config: CapabilityConfig,
}

impl CommandCapability {
    pub fn new(config: CapabilityConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Capability for CommandCapability {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &Value {
        &self.config.parameters
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<Value> {
        let input = serde_json::to_vec(&args).context("Failed to serialize capability arguments")?;
        let stdout = run_command(&self.config.command, &self.config.args, &input).await?;
        Ok(parse_output(&stdout))
    }

    async fn health_check(&self) -> Result<()> {
        let Some(args) = &self.config.health_check_args else {
            return Ok(());
        };

        run_command(&self.config.command, args, &[])
            .await
            .with_context(|| format!("Health check failed for '{}'", self.config.name))?;
        Ok(())
    }
}

fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Reasoning oracle implemented by an external command
///
/// The command receives `{"conversation": ..., "catalog": [...]}` on stdin
/// and prints the plan candidate (JSON, or text containing a fenced block).
pub struct CommandOracle {
    config: OracleConfig,
}

impl CommandOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReasoningOracle for CommandOracle {
    fn name(&self) -> &str {
        &self.config.command
    }

    async fn generate_plan(
        &self,
        conversation: &Conversation,
        catalog: &[CapabilityDescriptor],
    ) -> Result<PlanCandidate> {
        let request = json!({
            "conversation": conversation,
            "catalog": catalog,
        });
        let input = serde_json::to_vec(&request).context("Failed to serialize oracle request")?;

        let budget = Budget::new(Duration::from_millis(self.config.budget_ms));
        let stdout = with_budget(&budget, run_command(&self.config.command, &self.config.args, &input))
            .await
            .map_err(|e| match e {
                BudgetError::Task(e) => e,
                other => anyhow::anyhow!("Oracle '{}': {}", self.config.command, other),
            })?;

        Ok(PlanCandidate::Text(stdout))
    }
}
