//! Append-only accumulation of step outputs.

use serde::{Deserialize, Serialize};

/// Formats the section appended for the `count`-th completed step.
#[must_use]
pub fn step_section(count: usize, output: &str) -> String {
    format!("\n--- Step {count} Output ---\n{output}\n")
}

/// Ordered log of completed step outputs plus their concatenated context.
///
/// The concatenated context is a pure function of the output list: each
/// append extends it with one [`step_section`] and nothing is ever removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulationState {
    outputs: Vec<String>,
    context: String,
}

impl AccumulationState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a state from an ordered list of outputs.
    #[must_use]
    pub fn from_outputs(outputs: Vec<String>) -> Self {
        let context = outputs
            .iter()
            .enumerate()
            .map(|(i, output)| step_section(i + 1, output))
            .collect();
        Self { outputs, context }
    }

    /// Records one completed step.
    pub fn append(&mut self, output: impl Into<String>) {
        let output = output.into();
        let section = step_section(self.outputs.len() + 1, &output);
        self.context.push_str(&section);
        self.outputs.push(output);
    }

    /// Returns the concatenated context.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns the number of completed steps.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.outputs.len()
    }

    /// Returns the per-step outputs in completion order.
    #[must_use]
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Returns true when no step has completed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Consumes the state into its concatenated context.
    #[must_use]
    pub fn into_context(self) -> String {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initial_state() {
        let state = AccumulationState::new();
        assert_eq!(state.context(), "");
        assert_eq!(state.completed(), 0);
        assert!(state.outputs().is_empty());
    }

    #[test]
    fn test_append_numbers_sections() {
        let mut state = AccumulationState::new();
        state.append("First output");
        assert_eq!(state.completed(), 1);
        assert!(state.context().contains("Step 1 Output"));
        assert!(state.context().contains("First output"));

        state.append("Second output");
        assert_eq!(state.completed(), 2);
        assert_eq!(
            state.context(),
            "\n--- Step 1 Output ---\nFirst output\n\n--- Step 2 Output ---\nSecond output\n"
        );
    }

    #[test]
    fn test_append_only_extends_prefix() {
        let mut state = AccumulationState::new();
        state.append("a");
        let before = state.context().to_string();
        state.append("b");
        assert!(state.context().starts_with(&before));
    }

    #[test]
    fn test_from_outputs_matches_appends() {
        let mut appended = AccumulationState::new();
        for output in ["x", "y", "z"] {
            appended.append(output);
        }
        let rebuilt =
            AccumulationState::from_outputs(vec!["x".into(), "y".into(), "z".into()]);
        assert_eq!(rebuilt, appended);
    }
}
