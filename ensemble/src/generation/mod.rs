//! Generation client interface.
//!
//! The pipeline consumes text generation as a single awaited call per pass.
//! Connection-level retry and backoff belong to the client, never to the
//! pipeline: whatever error a client returns is final for the current run.

#[cfg(feature = "ollama")]
mod ollama;
mod retry;

#[cfg(feature = "ollama")]
pub use ollama::OllamaClient;
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryState};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a generation client can surface once its own retries are spent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The endpoint could not be reached.
    #[error("Failed to connect to generation endpoint at {endpoint} after {attempts} attempts: {message}")]
    Unavailable {
        /// The endpoint that was contacted.
        endpoint: String,
        /// How many attempts were made.
        attempts: usize,
        /// The last transport error or retryable HTTP status.
        message: String,
    },

    /// The endpoint did not answer in time.
    #[error("Timeout waiting for model response after {attempts} attempts")]
    Timeout {
        /// How many attempts were made.
        attempts: usize,
    },

    /// The endpoint answered with an error the client does not retry.
    #[error("Generation endpoint rejected the request (status {status}): {message}")]
    Rejected {
        /// HTTP status code, or 0 when the body could not be decoded.
        status: u16,
        /// Response detail.
        message: String,
    },
}

impl GenerationError {
    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

/// Request payload for a single generation call.
///
/// Serializes to the `/api/generate` body understood by Ollama-compatible
/// servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier.
    pub model: String,
    /// Full prompt text.
    pub prompt: String,
    /// Sampling options.
    pub options: GenerationOptions,
    /// Streaming is never requested.
    pub stream: bool,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// Sampling options nested under `options` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f64,
}

impl GenerationRequest {
    /// Creates a non-streaming request.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        temperature: f64,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: GenerationOptions { temperature },
            stream: false,
            max_tokens,
        }
    }

    /// Returns the sampling temperature.
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.options.temperature
    }
}

/// Executes one prompt against one model configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generates text for the request.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] once the client has exhausted its own
    /// retry budget.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = GenerationRequest::new("test-model", "Test prompt", 0.5, 1000);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "test-model");
        assert_eq!(value["prompt"], "Test prompt");
        assert_eq!(value["options"]["temperature"], 0.5);
        assert_eq!(value["stream"], false);
        assert_eq!(value["max_tokens"], 1000);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout { attempts: 1 }.is_retryable());
        assert!(GenerationError::Unavailable {
            endpoint: "e".to_string(),
            attempts: 1,
            message: "m".to_string(),
        }
        .is_retryable());
        assert!(!GenerationError::Rejected {
            status: 400,
            message: "bad".to_string(),
        }
        .is_retryable());
    }
}
