//! Per-step working record.

use serde::{Deserialize, Serialize};

/// Everything one pass of the stage pipeline reads and produces for a step.
///
/// Created by the workflow driver, filled stage by stage, then discarded
/// once the hardened output has been appended to the accumulation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    /// 1-based step position.
    pub ordinal: u32,
    /// Step description from the guide.
    pub description: String,
    /// Full specification text.
    pub spec: String,
    /// Accumulated context from earlier steps.
    pub previous_output: String,
    /// Output of the draft stage, after its hook.
    pub draft: String,
    /// Output of the refine stage, after its hook.
    pub refined: String,
    /// Output of the harden stage, after its hook.
    pub hardened: String,
    /// Run identifier carried into events.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
}

impl StepContext {
    /// Creates a context for one step with empty stage outputs.
    #[must_use]
    pub fn new(
        ordinal: u32,
        description: impl Into<String>,
        spec: impl Into<String>,
        previous_output: impl Into<String>,
    ) -> Self {
        Self {
            ordinal,
            description: description.into(),
            spec: spec.into(),
            previous_output: previous_output.into(),
            ..Self::default()
        }
    }

    /// Tags the context with a run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }
}
