//! File-backed reasoning oracle.
//!
//! Returns a plan candidate stored on disk instead of asking a model. Useful
//! for offline runs, replays and validating hand-written plans.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::core::{CapabilityDescriptor, PlanCandidate, ReasoningOracle};
use crate::domain::Conversation;

/// Oracle that ignores the conversation and returns a stored candidate
pub struct FileOracle {
    path: PathBuf,
    name: String,
}

impl FileOracle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the candidate; YAML files are parsed, anything else is text
    pub fn load(&self) -> Result<PlanCandidate> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read plan file: {}", self.path.display()))?;

        let is_yaml = matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );

        if is_yaml {
            let value = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse plan YAML: {}", self.path.display()))?;
            Ok(PlanCandidate::Structured(value))
        } else {
            Ok(PlanCandidate::Text(content))
        }
    }
}

#[async_trait]
impl ReasoningOracle for FileOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_plan(
        &self,
        _conversation: &Conversation,
        _catalog: &[CapabilityDescriptor],
    ) -> Result<PlanCandidate> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_plan_is_structured() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plan.yaml");
        std::fs::write(
            &path,
            r#"
reasoning: Locate, then search
steps:
  - capability: geocode
    arguments: { query: Paris }
    purpose: Locate Paris
  - capability: nearby
    arguments: { query: museums }
    dependencies: [0]
    purpose: Find museums
"#,
        )
        .unwrap();

        match FileOracle::new(&path).load().unwrap() {
            PlanCandidate::Structured(value) => {
                assert_eq!(value["steps"][1]["dependencies"][0], 0);
            }
            other => panic!("Expected structured candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_json_plan_is_text() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plan.json");
        std::fs::write(&path, r#"{"reasoning": "r", "steps": []}"#).unwrap();

        let oracle = FileOracle::new(&path);
        assert!(oracle.name().starts_with("file:"));
        assert!(matches!(oracle.load().unwrap(), PlanCandidate::Text(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = FileOracle::new("/nonexistent/plan.json").load().unwrap_err();
        assert!(err.to_string().contains("Failed to read plan file"));
    }
}
