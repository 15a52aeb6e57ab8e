//! Plan generation and structural validation.
//!
//! The reasoning oracle proposes a candidate; this module decides whether the
//! candidate is a plan. Validation never repairs a candidate: a structural
//! defect rejects the whole thing.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::domain::plan::check_dependencies;
use crate::domain::{Conversation, Plan, PlanValidationError, Step};

use super::catalog::CapabilityDescriptor;

/// Raw output of the reasoning oracle
#[derive(Debug, Clone, PartialEq)]
pub enum PlanCandidate {
    /// Already-structured JSON
    Structured(Value),

    /// Free text expected to contain the plan as JSON
    Text(String),
}

impl PlanCandidate {
    /// Extract the JSON value from the candidate
    ///
    /// Text candidates may wrap the JSON in a ```json or ```plan fence, or be
    /// raw JSON.
    pub fn into_json(self) -> Result<Value, PlanValidationError> {
        match self {
            Self::Structured(value) => Ok(value),
            Self::Text(text) => parse_candidate_text(&text),
        }
    }
}

fn parse_candidate_text(text: &str) -> Result<Value, PlanValidationError> {
    let mut in_block = false;
    let mut block = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if !in_block {
            if let Some(remainder) = fence_opening(trimmed) {
                in_block = true;
                block.clear();
                block.push_str(remainder);
                block.push('\n');
            }
        } else if trimmed == "```" {
            return serde_json::from_str(&block).map_err(|e| PlanValidationError::Unparseable {
                reason: format!("fenced block is not valid JSON: {}", e),
            });
        } else {
            block.push_str(line);
            block.push('\n');
        }
    }

    serde_json::from_str(text.trim()).map_err(|e| PlanValidationError::Unparseable {
        reason: format!("no fenced block and text is not valid JSON: {}", e),
    })
}

/// Text after an opening ```json or ```plan fence (tag case-insensitive)
fn fence_opening(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("```")?;
    let tag_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let (tag, remainder) = rest.split_at(tag_len);

    (tag.eq_ignore_ascii_case("json") || tag.eq_ignore_ascii_case("plan")).then_some(remainder)
}

/// External reasoning oracle that proposes plans
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Human-readable oracle name
    fn name(&self) -> &str;

    /// Propose a plan for the conversation using the described capabilities
    async fn generate_plan(
        &self,
        conversation: &Conversation,
        catalog: &[CapabilityDescriptor],
    ) -> anyhow::Result<PlanCandidate>;
}

/// Non-fatal findings about an accepted plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanWarning {
    #[error("Step {step} names capability '{capability}' which is not in the catalog")]
    UnknownCapability { step: usize, capability: String },
}

/// A validated plan plus anything worth flagging about it
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPlan {
    pub plan: Plan,
    pub warnings: Vec<PlanWarning>,
}

/// Why no plan could be produced
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Reasoning oracle '{oracle}' failed: {source:#}")]
    Oracle {
        oracle: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid plan: {0}")]
    Validation(#[from] PlanValidationError),

    #[error("Planning aborted by cancellation")]
    Aborted,
}

/// Turns a conversation into a validated plan via the oracle
#[derive(Clone)]
pub struct PlanGenerator {
    oracle: Arc<dyn ReasoningOracle>,
}

impl PlanGenerator {
    pub fn new(oracle: Arc<dyn ReasoningOracle>) -> Self {
        Self { oracle }
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Ask the oracle for a plan and validate it against `catalog`
    #[instrument(skip_all, fields(oracle = %self.oracle.name()))]
    pub async fn generate(
        &self,
        conversation: &Conversation,
        catalog: &[CapabilityDescriptor],
    ) -> Result<GeneratedPlan, PlanError> {
        let candidate = self
            .oracle
            .generate_plan(conversation, catalog)
            .await
            .map_err(|source| PlanError::Oracle {
                oracle: self.oracle.name().to_string(),
                source,
            })?;

        let generated = validate_candidate(candidate.into_json()?, catalog)?;

        for warning in &generated.warnings {
            warn!(%warning, "Plan references unknown capability");
        }
        debug!(steps = generated.plan.len(), "Plan accepted");

        Ok(generated)
    }
}

/// Validate a raw JSON candidate into a plan
///
/// Expected shape:
/// ```json
/// {
///   "reasoning": "string",
///   "steps": [
///     {
///       "capability": "string",
///       "arguments": { ... },
///       "dependencies": [0, ...],
///       "purpose": "string",
///       "budget_ms": 5000
///     }
///   ]
/// }
/// ```
///
/// `arguments`, `dependencies` and `budget_ms` are optional. Capability names
/// missing from `catalog` only produce warnings, since the live catalog may
/// differ by the time the plan runs.
pub fn validate_candidate(
    candidate: Value,
    catalog: &[CapabilityDescriptor],
) -> Result<GeneratedPlan, PlanValidationError> {
    let Value::Object(mut root) = candidate else {
        return Err(PlanValidationError::NotAnObject);
    };

    let reasoning = match root.remove("reasoning") {
        None | Some(Value::Null) => {
            return Err(PlanValidationError::MissingField { field: "reasoning" })
        }
        Some(Value::String(s)) => s,
        Some(_) => {
            return Err(PlanValidationError::WrongType {
                field: "reasoning",
                expected: "a string",
            })
        }
    };
    if reasoning.trim().is_empty() {
        return Err(PlanValidationError::EmptyReasoning);
    }

    let raw_steps = match root.remove("steps") {
        None | Some(Value::Null) => return Err(PlanValidationError::MissingField { field: "steps" }),
        Some(Value::Array(steps)) => steps,
        Some(_) => {
            return Err(PlanValidationError::WrongType {
                field: "steps",
                expected: "an array",
            })
        }
    };
    if raw_steps.is_empty() {
        return Err(PlanValidationError::EmptySteps);
    }

    let mut steps = Vec::with_capacity(raw_steps.len());
    let mut warnings = Vec::new();

    for (index, raw) in raw_steps.into_iter().enumerate() {
        let step = parse_step(index, raw)?;

        if !catalog.iter().any(|d| d.name == step.capability) {
            warnings.push(PlanWarning::UnknownCapability {
                step: index,
                capability: step.capability.clone(),
            });
        }

        steps.push(step);
    }

    Ok(GeneratedPlan {
        plan: Plan::new(reasoning, steps),
        warnings,
    })
}

fn parse_step(index: usize, raw: Value) -> Result<Step, PlanValidationError> {
    let Value::Object(mut fields) = raw else {
        return Err(PlanValidationError::StepNotAnObject { step: index });
    };

    let capability = required_string(index, &mut fields, "capability")?;
    if capability.trim().is_empty() {
        return Err(PlanValidationError::EmptyCapability { step: index });
    }

    let purpose = required_string(index, &mut fields, "purpose")?;

    let arguments = match fields.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(arguments)) => arguments,
        Some(_) => {
            return Err(PlanValidationError::StepWrongType {
                step: index,
                field: "arguments",
                expected: "an object",
            })
        }
    };

    let dependencies = match fields.remove("dependencies") {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(Value::Array(raw)) => {
            let mut dependencies = BTreeSet::new();
            for value in raw {
                let dependency = value
                    .as_u64()
                    .and_then(|d| usize::try_from(d).ok())
                    .ok_or_else(|| PlanValidationError::InvalidDependency {
                        step: index,
                        value: value.to_string(),
                    })?;
                dependencies.insert(dependency);
            }
            dependencies
        }
        Some(_) => {
            return Err(PlanValidationError::StepWrongType {
                step: index,
                field: "dependencies",
                expected: "an array of step indices",
            })
        }
    };
    check_dependencies(index, dependencies.iter().copied())?;

    let budget_ms = match fields.remove("budget_ms") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_u64().ok_or(PlanValidationError::StepWrongType {
            step: index,
            field: "budget_ms",
            expected: "a non-negative integer",
        })?),
    };

    Ok(Step {
        capability,
        arguments,
        dependencies,
        purpose,
        budget_ms,
    })
}

fn required_string(
    step: usize,
    fields: &mut Map<String, Value>,
    field: &'static str,
) -> Result<String, PlanValidationError> {
    match fields.remove(field) {
        None | Some(Value::Null) => Err(PlanValidationError::StepMissingField { step, field }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(PlanValidationError::StepWrongType {
            step,
            field,
            expected: "a string",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Vec<CapabilityDescriptor> {
        ["geocode", "nearby"]
            .into_iter()
            .map(|name| CapabilityDescriptor {
                name: name.to_string(),
                description: format!("{} capability", name),
                parameters: json!({"type": "object"}),
            })
            .collect()
    }

    #[test]
    fn test_valid_candidate() {
        let candidate = json!({
            "reasoning": "Locate, then search around",
            "steps": [
                {"capability": "geocode", "arguments": {"query": "Paris"}, "purpose": "Locate Paris"},
                {"capability": "nearby", "arguments": {"query": "museums"}, "dependencies": [0], "purpose": "Find museums"}
            ]
        });

        let generated = validate_candidate(candidate, &catalog()).unwrap();
        assert_eq!(generated.plan.len(), 2);
        assert!(generated.warnings.is_empty());
        assert!(generated.plan.steps[1].dependencies.contains(&0));
    }

    #[test]
    fn test_unknown_capability_is_a_warning() {
        let candidate = json!({
            "reasoning": "Use a tool that may exist later",
            "steps": [{"capability": "weather", "purpose": "Check weather"}]
        });

        let generated = validate_candidate(candidate, &catalog()).unwrap();
        assert_eq!(
            generated.warnings,
            vec![PlanWarning::UnknownCapability {
                step: 0,
                capability: "weather".to_string()
            }]
        );
    }

    #[test]
    fn test_negative_dependency_rejected() {
        let candidate = json!({
            "reasoning": "r",
            "steps": [
                {"capability": "geocode", "purpose": "p"},
                {"capability": "nearby", "purpose": "p", "dependencies": [-1]}
            ]
        });

        assert_eq!(
            validate_candidate(candidate, &catalog()),
            Err(PlanValidationError::InvalidDependency {
                step: 1,
                value: "-1".to_string()
            })
        );
    }

    #[test]
    fn test_wrong_types_rejected() {
        let candidate = json!({"reasoning": 42, "steps": []});
        assert_eq!(
            validate_candidate(candidate, &catalog()),
            Err(PlanValidationError::WrongType {
                field: "reasoning",
                expected: "a string"
            })
        );

        let candidate = json!({
            "reasoning": "r",
            "steps": [{"capability": "geocode", "purpose": "p", "arguments": ["Paris"]}]
        });
        assert_eq!(
            validate_candidate(candidate, &catalog()),
            Err(PlanValidationError::StepWrongType {
                step: 0,
                field: "arguments",
                expected: "an object"
            })
        );

        let candidate = json!({
            "reasoning": "r",
            "steps": [{"capability": "geocode", "purpose": "p", "dependencies": [0.5]}]
        });
        assert!(matches!(
            validate_candidate(candidate, &catalog()),
            Err(PlanValidationError::InvalidDependency { step: 0, .. })
        ));
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert_eq!(
            validate_candidate(json!({"steps": []}), &catalog()),
            Err(PlanValidationError::MissingField { field: "reasoning" })
        );
        assert_eq!(
            validate_candidate(json!({"reasoning": "r", "steps": [{"capability": "geocode"}]}), &catalog()),
            Err(PlanValidationError::StepMissingField {
                step: 0,
                field: "purpose"
            })
        );
        assert_eq!(
            validate_candidate(json!(["not", "an", "object"]), &catalog()),
            Err(PlanValidationError::NotAnObject)
        );
    }

    #[test]
    fn test_fenced_text_candidate() {
        let text = r#"Here is my plan:

```plan
{"reasoning": "one step", "steps": [{"capability": "geocode", "purpose": "Locate"}]}
```
"#;
        let value = PlanCandidate::Text(text.to_string()).into_json().unwrap();
        assert_eq!(value["reasoning"], "one step");
    }

    #[test]
    fn test_fence_tag_is_case_insensitive() {
        let upper = "Plan below.\n```JSON\n{\"reasoning\": \"upper\"}\n```\n";
        let value = PlanCandidate::Text(upper.to_string()).into_json().unwrap();
        assert_eq!(value["reasoning"], "upper");

        let inline_brace = "```json {\n\"reasoning\": \"inline\"\n}\n```";
        let value = PlanCandidate::Text(inline_brace.to_string()).into_json().unwrap();
        assert_eq!(value["reasoning"], "inline");

        // Other languages are not plan fences
        let other = "```jsonc\n{\"reasoning\": \"no\"}\n```";
        assert!(matches!(
            PlanCandidate::Text(other.to_string()).into_json(),
            Err(PlanValidationError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_raw_json_text_candidate() {
        let text = r#"  {"reasoning": "r", "steps": []}  "#;
        let value = PlanCandidate::Text(text.to_string()).into_json().unwrap();
        assert!(value["steps"].as_array().unwrap().is_empty());

        let result = PlanCandidate::Text("I cannot plan this".to_string()).into_json();
        assert!(matches!(result, Err(PlanValidationError::Unparseable { .. })));
    }
}
