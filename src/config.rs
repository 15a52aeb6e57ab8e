//! Configuration for the toolplan engine.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TOOLPLAN_HOME)
//! 2. Config file (.toolplan/config.yaml)
//! 3. Defaults (~/.toolplan, built-in engine settings, empty catalog)
//!
//! Config file discovery:
//! - Searches current directory and parents for .toolplan/config.yaml
//! - Relative paths in the config file resolve against the project root
//!   (the directory containing .toolplan/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::aggregator::DEFAULT_PREVIEW_CHARS;
use crate::core::executor::DEFAULT_STEP_BUDGET;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    /// Engine state directory (relative to the project root)
    pub home: Option<String>,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub oracle: Option<OracleConfig>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityConfig>,
}

/// Tunables for the orchestration engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Default per-step budget in milliseconds
    #[serde(default = "default_step_budget_ms")]
    pub step_budget_ms: u64,

    /// Maximum characters of each value/error shown in the synthesis
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Limit for concurrent independent work (health checks, batch requests)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: i64,
}

fn default_step_budget_ms() -> u64 {
    DEFAULT_STEP_BUDGET.as_millis() as u64
}
fn default_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}
fn default_concurrency_limit() -> i64 {
    4
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            step_budget_ms: default_step_budget_ms(),
            preview_chars: default_preview_chars(),
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

impl EngineSettings {
    pub fn step_budget(&self) -> Duration {
        Duration::from_millis(self.step_budget_ms)
    }
}

/// Reasoning oracle backed by an external command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// How long to wait for a plan
    #[serde(default = "default_oracle_budget_ms")]
    pub budget_ms: u64,
}

fn default_oracle_budget_ms() -> u64 {
    60_000
}

/// Capability backed by an external command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub name: String,
    pub description: String,
    /// JSON schema shown to the oracle
    #[serde(default = "default_parameters")]
    pub parameters: Value,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments for a cheap liveness probe (e.g. ["--version"])
    #[serde(default)]
    pub health_check_args: Option<Vec<String>>,
}

fn default_parameters() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to toolplan home (traces, engine state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Engine tunables
    pub engine: EngineSettings,
    /// Oracle command (if configured)
    pub oracle: Option<OracleConfig>,
    /// Command-backed capabilities
    pub capabilities: Vec<CapabilityConfig>,
}

impl ResolvedConfig {
    /// Directory for JSONL traces
    pub fn traces_dir(&self) -> PathBuf {
        self.home.join("traces")
    }

    /// Daily trace file used when `run` is not given an explicit path
    pub fn default_trace_path(&self, date: NaiveDate) -> PathBuf {
        self.traces_dir()
            .join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".toolplan").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse config YAML content
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = serde_yaml::from_str(content).context("Invalid config YAML")?;

    for (index, capability) in config.capabilities.iter().enumerate() {
        if capability.name.trim().is_empty() {
            anyhow::bail!("Capability {} has an empty name", index);
        }
        if capability.command.trim().is_empty() {
            anyhow::bail!("Capability '{}' has an empty command", capability.name);
        }
    }

    Ok(config)
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".toolplan");

    let env_home = std::env::var("TOOLPLAN_HOME").ok().map(PathBuf::from);

    let Some(config_path) = find_config_file() else {
        return Ok(ResolvedConfig {
            home: env_home.unwrap_or(default_home),
            config_file: None,
            engine: EngineSettings::default(),
            oracle: None,
            capabilities: Vec::new(),
        });
    };

    let config = load_config_file(&config_path)?;
    Ok(resolve_config(config_path, config, env_home, default_home))
}

/// Resolve paths in a parsed config file against its project root
///
/// The project root is the directory containing `.toolplan/`, so commands
/// like `./bin/geocode` work from any subdirectory.
fn resolve_config(
    config_path: PathBuf,
    config: ConfigFile,
    env_home: Option<PathBuf>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let base_dir = config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let home = match (env_home, &config.home) {
        (Some(home), _) => home,
        (None, Some(home)) => resolve_path(&base_dir, home),
        (None, None) => default_home,
    };

    let oracle = config.oracle.map(|mut oracle| {
        oracle.command = resolve_command(&base_dir, &oracle.command);
        oracle
    });

    let capabilities = config
        .capabilities
        .into_iter()
        .map(|mut capability| {
            capability.command = resolve_command(&base_dir, &capability.command);
            capability
        })
        .collect();

    ResolvedConfig {
        home,
        config_file: Some(config_path),
        engine: config.engine,
        oracle,
        capabilities,
    }
}

/// Path-like commands resolve against `base`; bare names are left for PATH lookup
fn resolve_command(base: &Path, command: &str) -> String {
    if command.contains('/') || command.contains(std::path::MAIN_SEPARATOR) {
        resolve_path(base, command).to_string_lossy().into_owned()
    } else {
        command.to_string()
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
