//! Error types for the ensemble workflow.
//!
//! Every failure the core can raise terminates the current workflow or chain
//! run. Progress already checkpointed before the failure stays resumable.

use crate::generation::GenerationError;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = EnsembleError> = std::result::Result<T, E>;

/// The main error type for ensemble operations.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// The guide path could not be read.
    #[error("Guide file not found: {}\nAvailable guides: {}", .path.display(), format_available(.available))]
    GuideNotFound {
        /// The path that was requested.
        path: PathBuf,
        /// Guide-like files found next to the requested path.
        available: Vec<String>,
    },

    /// The guide was readable but contained no step lines.
    #[error("No valid steps found in {}\nExpected format: 'Step N: [description]'", .path.display())]
    GuideEmpty {
        /// The guide that was parsed.
        path: PathBuf,
    },

    /// The checkpoint file does not hold a valid checkpoint record.
    #[error("Checkpoint {} is corrupt: {reason}", .path.display())]
    CheckpointCorrupt {
        /// The checkpoint location.
        path: PathBuf,
        /// What was wrong with its content.
        reason: String,
    },

    /// A resume checkpoint belongs to a different guide or specification.
    #[error("Checkpoint {} does not match this run: {field} differs (checkpoint: {expected:?}, run: {actual:?})", .path.display())]
    CheckpointMismatch {
        /// The checkpoint location.
        path: PathBuf,
        /// Which field disagreed.
        field: &'static str,
        /// Value recorded in the checkpoint (truncated for display).
        expected: String,
        /// Value supplied to the current run (truncated for display).
        actual: String,
    },

    /// The generation client gave up on a request.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A filesystem operation failed.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl EnsembleError {
    /// Creates an IO error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a checkpoint-corruption error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CheckpointCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns a stable, snake_case code identifying the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GuideNotFound { .. } => "guide_not_found",
            Self::GuideEmpty { .. } => "guide_empty",
            Self::CheckpointCorrupt { .. } => "checkpoint_corrupt",
            Self::CheckpointMismatch { .. } => "checkpoint_mismatch",
            Self::Generation(GenerationError::Unavailable { .. }) => "generation_unavailable",
            Self::Generation(GenerationError::Timeout { .. }) => "generation_timeout",
            Self::Generation(GenerationError::Rejected { .. }) => "generation_rejected",
            Self::Config(_) => "config",
            Self::Io { .. } => "io",
        }
    }
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guide_not_found_lists_alternatives() {
        let err = EnsembleError::GuideNotFound {
            path: PathBuf::from("missing_guide.txt"),
            available: vec!["a_guide.txt".to_string(), "b_guide.txt".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("missing_guide.txt"));
        assert!(message.contains("a_guide.txt, b_guide.txt"));
        assert_eq!(err.kind(), "guide_not_found");
    }

    #[test]
    fn test_guide_not_found_without_alternatives() {
        let err = EnsembleError::GuideNotFound {
            path: PathBuf::from("x.txt"),
            available: Vec::new(),
        };
        assert!(err.to_string().ends_with("Available guides: none"));
    }

    #[test]
    fn test_generation_kinds_are_distinct() {
        let unavailable: EnsembleError = GenerationError::Unavailable {
            endpoint: "http://localhost".to_string(),
            attempts: 3,
            message: "refused".to_string(),
        }
        .into();
        let timeout: EnsembleError = GenerationError::Timeout { attempts: 3 }.into();

        assert_eq!(unavailable.kind(), "generation_unavailable");
        assert_eq!(timeout.kind(), "generation_timeout");
        assert_ne!(unavailable.to_string(), timeout.to_string());
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = EnsembleError::io(
            "out.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.kind(), "io");
    }
}
