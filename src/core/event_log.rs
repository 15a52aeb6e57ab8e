//! Append-only trace of orchestration events.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy debugging/inspection. The log is an observer: a write failure is
//! reported through `tracing` and never fails the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{Event, EventType};

use super::observer::ExecutionObserver;

/// File-backed JSONL event log
pub struct EventLog {
    /// Path to the .jsonl file
    path: PathBuf,

    /// Serializes appends from concurrent runs sharing one log
    write_lock: Mutex<()>,
}

impl EventLog {
    /// Open (or prepare to create) a log at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create trace directory: {}", parent.display()))?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the path to the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let json = serde_json::to_string(event).context("Failed to serialize event")?;

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open trace file: {}", self.path.display()))?;

        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open trace file: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Events belonging to one run, in order
    pub async fn events_for_run(&self, run_id: Uuid) -> Result<Vec<Event>> {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(|e| e.run_id == run_id).collect())
    }

    /// Distinct run ids in order of first appearance
    pub async fn list_runs(&self) -> Result<Vec<Uuid>> {
        let mut runs = Vec::new();
        for event in self.replay().await? {
            if event.event_type == EventType::RunStarted && !runs.contains(&event.run_id) {
                runs.push(event.run_id);
            }
        }
        Ok(runs)
    }
}

#[async_trait]
impl ExecutionObserver for EventLog {
    async fn observe(&self, event: &Event) {
        if let Err(e) = self.append(event).await {
            warn!(path = %self.path.display(), error = %e, "Failed to record event");
        }
    }
}

/// Generate a correlation key for a step invocation
pub fn correlation_key(run_id: Uuid, step_index: usize, arguments: &Value) -> String {
    format!("{}:{}:{}", run_id, step_index, hash_arguments(arguments))
}

/// Hash arguments (first 16 hex chars of SHA256 over their JSON form)
pub fn hash_arguments(arguments: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(arguments.to_string().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepStatus;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_log() -> (EventLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log = EventLog::open(temp_dir.path().join("traces").join("events.jsonl"))
            .await
            .unwrap();
        (log, temp_dir)
    }

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let (log, _temp) = create_test_log().await;
        let run_id = Uuid::new_v4();

        let started = Event::new(
            run_id,
            EventType::RunStarted,
            format!("{}:start", run_id),
            "Run started".to_string(),
            StepStatus::Running,
        );
        let step = Event::new(
            run_id,
            EventType::StepStarted,
            correlation_key(run_id, 0, &json!({"query": "Paris"})),
            "Step 0 started".to_string(),
            StepStatus::Running,
        )
        .for_step(0, "geocode");

        log.append(&started).await.unwrap();
        log.append(&step).await.unwrap();

        let events = log.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[1].event_type, EventType::StepStarted);
        assert_eq!(log.list_runs().await.unwrap(), vec![run_id]);
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let (log, _temp) = create_test_log().await;
        assert!(log.replay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_filtered_by_run() {
        let (log, _temp) = create_test_log().await;
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        for run_id in [first, second, first] {
            let event = Event::new(
                run_id,
                EventType::StepStarted,
                format!("{}:0:abc", run_id),
                "Step started".to_string(),
                StepStatus::Running,
            );
            log.observe(&event).await;
        }

        assert_eq!(log.events_for_run(first).await.unwrap().len(), 2);
        assert_eq!(log.events_for_run(second).await.unwrap().len(), 1);
    }

    #[test]
    fn test_correlation_key_format() {
        let run_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = correlation_key(run_id, 3, &json!({"query": "museums"}));

        // Format: {run_id}:{step_index}:{hash16}
        assert!(key.starts_with("550e8400-e29b-41d4-a716-446655440000:3:"));
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 16);
    }

    #[test]
    fn test_argument_hash_consistency() {
        let hash1 = hash_arguments(&json!({"query": "Paris"}));
        let hash2 = hash_arguments(&json!({"query": "Paris"}));
        let hash3 = hash_arguments(&json!({"query": "Lyon"}));

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }
}
