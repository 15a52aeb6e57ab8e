//! Synthesis of step outcomes into one bounded artifact.
//!
//! The artifact is input for a downstream response writer, never text to show
//! a user as-is. Every value and error is previewed up to a fixed number of
//! characters so the artifact can be fed back into another reasoning call.

use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;

use crate::domain::{ExecutionState, Plan, StepOutcome};

/// Default preview length, in characters
pub const DEFAULT_PREVIEW_CHARS: usize = 500;

/// Heading that marks the artifact as internal
pub const SYNTHESIS_HEADER: &str = "# Internal Orchestration Synthesis";

const SYNTHESIS_NOTICE: &str =
    "> Internal working notes for the response writer. Not user-facing text.";

const SYNTHESIS_INSTRUCTION: &str = "**INSTRUCTION:** Using the results above and the original \
conversation, write the final answer for the user. Do not mention planning, steps, capabilities \
or this synthesis; present only the answer itself.";

/// The aggregated, bounded artifact for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Synthesis {
    pub text: String,
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for Synthesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds [`Synthesis`] artifacts
#[derive(Debug, Clone, Copy)]
pub struct ResultAggregator {
    preview_chars: usize,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CHARS)
    }
}

impl ResultAggregator {
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }

    pub fn preview_chars(&self) -> usize {
        self.preview_chars
    }

    /// Summarize `plan` and its recorded results
    pub fn aggregate(&self, plan: &Plan, state: &ExecutionState) -> Synthesis {
        let mut text = String::new();

        // Writing into a String cannot fail
        let _ = writeln!(text, "{}\n", SYNTHESIS_HEADER);
        let _ = writeln!(text, "{}\n", SYNTHESIS_NOTICE);
        let _ = writeln!(text, "## Plan Reasoning\n\n{}\n", plan.reasoning.trim());
        let _ = writeln!(text, "## Step Results");

        for (index, step) in plan.steps.iter().enumerate() {
            let _ = writeln!(
                text,
                "\n### Step {}: {} (`{}`)",
                index + 1,
                step.purpose,
                step.capability
            );

            match state.get(index).map(|r| &r.outcome) {
                Some(StepOutcome::Success { value }) => {
                    let rendered =
                        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                    let _ = writeln!(text, "**Status:** SUCCESS");
                    let _ = writeln!(
                        text,
                        "**Result preview:**\n```json\n{}\n```",
                        self.preview(&rendered)
                    );
                }
                Some(StepOutcome::Failure { kind, message }) => {
                    let _ = writeln!(text, "**Status:** FAILURE ({})", kind);
                    let _ = writeln!(text, "**Error:** {}", self.preview(message));
                }
                None => {
                    let _ = writeln!(text, "**Status:** FAILURE (no result recorded)");
                }
            }
        }

        let _ = write!(text, "\n---\n{}\n", SYNTHESIS_INSTRUCTION);

        Synthesis {
            text,
            succeeded: state.succeeded(),
            failed: plan.len().saturating_sub(state.succeeded()),
        }
    }

    /// Truncate to the preview length on a character boundary
    fn preview(&self, content: &str) -> String {
        match content.char_indices().nth(self.preview_chars) {
            Some((cut, _)) => format!("{}...", &content[..cut]),
            None => content.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, Step, StepResult};
    use serde_json::json;

    fn plan() -> Plan {
        Plan::new(
            "Locate the city, then search nearby",
            vec![
                Step::new("geocode", "Locate Paris"),
                Step::new("nearby", "Find museums").depends_on(0),
            ],
        )
    }

    #[test]
    fn test_sections_and_markers() {
        let mut state = ExecutionState::new();
        state.record(StepResult::success(0, "geocode", json!({"lat": 48.8566, "lon": 2.3522})));
        state.record(StepResult::failure(
            1,
            "nearby",
            ErrorKind::BudgetExceeded,
            "Budget of 50ms exceeded",
        ));

        let synthesis = ResultAggregator::default().aggregate(&plan(), &state);

        assert!(synthesis.text.starts_with(SYNTHESIS_HEADER));
        assert!(synthesis.text.contains("Locate the city, then search nearby"));
        assert!(synthesis.text.contains("### Step 1: Locate Paris (`geocode`)"));
        assert!(synthesis.text.contains("**Status:** SUCCESS"));
        assert!(synthesis.text.contains("48.8566"));
        assert!(synthesis.text.contains("**Status:** FAILURE (budget_exceeded)"));
        assert!(synthesis.text.contains("**INSTRUCTION:**"));
        assert_eq!((synthesis.succeeded, synthesis.failed), (1, 1));
    }

    #[test]
    fn test_preview_is_bounded() {
        let long = "é".repeat(2_000);
        let mut state = ExecutionState::new();
        state.record(StepResult::success(0, "geocode", json!(long)));
        state.record(StepResult::failure(
            1,
            "nearby",
            ErrorKind::CapabilityExecutionError,
            "x".repeat(2_000),
        ));

        let aggregator = ResultAggregator::new(100);
        let synthesis = aggregator.aggregate(&plan(), &state);

        assert!(!synthesis.text.contains(&"é".repeat(101)));
        assert!(!synthesis.text.contains(&"x".repeat(101)));
        assert!(synthesis.text.contains(&format!("{}...", "x".repeat(100))));
    }

    #[test]
    fn test_missing_result_reported() {
        let mut state = ExecutionState::new();
        state.record(StepResult::success(0, "geocode", json!(1)));

        let synthesis = ResultAggregator::default().aggregate(&plan(), &state);
        assert!(synthesis.text.contains("no result recorded"));
        assert_eq!(synthesis.failed, 1);
    }

    #[test]
    fn test_short_content_untouched() {
        let aggregator = ResultAggregator::new(5);
        assert_eq!(aggregator.preview("abcde"), "abcde");
        assert_eq!(aggregator.preview("abcdef"), "abcde...");
    }
}
