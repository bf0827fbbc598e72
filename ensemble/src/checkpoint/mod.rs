//! Durable workflow checkpoints.
//!
//! One JSON file holds the latest snapshot for a workflow run and is
//! overwritten after every completed step.

use crate::errors::{EnsembleError, Result};
use crate::state::AccumulationState;
use crate::utils::{iso_timestamp, parse_timestamp, Timestamp, TimestampError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Point-in-time copy of a workflow's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Identifier of the guide being executed.
    pub guide_file: String,
    /// Full specification text of the run.
    pub spec: String,
    /// Number of completed steps.
    pub completed_steps: usize,
    /// Concatenated accumulated output.
    pub cumulative_output: String,
    /// Per-step outputs in completion order.
    pub step_outputs: Vec<String>,
    /// ISO 8601 creation time.
    pub timestamp: String,
}

impl Checkpoint {
    /// Snapshots an accumulation state, stamped with the current time.
    #[must_use]
    pub fn capture(
        guide_file: impl Into<String>,
        spec: impl Into<String>,
        state: &AccumulationState,
    ) -> Self {
        Self {
            guide_file: guide_file.into(),
            spec: spec.into(),
            completed_steps: state.completed(),
            cumulative_output: state.context().to_string(),
            step_outputs: state.outputs().to_vec(),
            timestamp: iso_timestamp(),
        }
    }

    /// Rebuilds the accumulation state recorded in this checkpoint.
    #[must_use]
    pub fn to_state(&self) -> AccumulationState {
        AccumulationState::from_outputs(self.step_outputs.clone())
    }

    /// Parses the creation timestamp.
    ///
    /// # Errors
    ///
    /// Returns a `TimestampError` for a non-ISO timestamp string.
    pub fn created_at(&self) -> std::result::Result<Timestamp, TimestampError> {
        parse_timestamp(&self.timestamp)
    }

    /// Writes the checkpoint as JSON, replacing any existing file.
    ///
    /// The record goes to a sibling temporary file first and is renamed into
    /// place, so readers never observe a partial write.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EnsembleError::corrupt(path, e.to_string()))?;

        let tmp = temp_sibling(path);
        std::fs::write(&tmp, json).map_err(|e| EnsembleError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| EnsembleError::io(path, e))?;

        debug!(
            checkpoint = %path.display(),
            completed_steps = self.completed_steps,
            "Checkpoint written"
        );
        Ok(())
    }

    /// Reads a checkpoint written by [`Checkpoint::save`].
    ///
    /// # Errors
    ///
    /// - [`EnsembleError::Io`] if the file cannot be read.
    /// - [`EnsembleError::CheckpointCorrupt`] if the content is not a
    ///   checkpoint record, its step count disagrees with its output list, or
    ///   its concatenated output is not the one its step outputs produce.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| EnsembleError::io(path, e))?;
        let checkpoint: Self =
            serde_json::from_str(&raw).map_err(|e| EnsembleError::corrupt(path, e.to_string()))?;

        if checkpoint.completed_steps != checkpoint.step_outputs.len() {
            return Err(EnsembleError::corrupt(
                path,
                format!(
                    "completed_steps is {} but {} step outputs are recorded",
                    checkpoint.completed_steps,
                    checkpoint.step_outputs.len()
                ),
            ));
        }
        if checkpoint.cumulative_output != checkpoint.to_state().context() {
            return Err(EnsembleError::corrupt(
                path,
                "cumulative_output does not match the recorded step outputs",
            ));
        }
        Ok(checkpoint)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
