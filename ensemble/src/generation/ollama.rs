//! HTTP client for Ollama-compatible `/api/generate` endpoints.

use super::retry::{with_retry, RetryConfig};
use super::{GenerationClient, GenerationError, GenerationRequest};
use crate::config::Settings;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Status codes worth another attempt.
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Generation client that POSTs to an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Outcome of a single attempt, before retry classification.
#[derive(Debug)]
enum AttemptError {
    Connect(String),
    Timeout,
    Status(u16, String),
    Decode(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "connection failed: {msg}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Status(status, body) => write!(f, "HTTP {status}: {body}"),
            Self::Decode(msg) => write!(f, "invalid response body: {msg}"),
        }
    }
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout => true,
            Self::Status(status, _) => RETRYABLE_STATUS.contains(status),
            Self::Decode(_) => false,
        }
    }
}

impl OllamaClient {
    /// Creates a client for the endpoint with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Unavailable`] if the HTTP client cannot be
    /// constructed.
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, GenerationError> {
        let endpoint = endpoint.into();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable {
                endpoint: endpoint.clone(),
                attempts: 0,
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            endpoint,
            retry,
        })
    }

    /// Creates a client from workflow settings.
    ///
    /// # Errors
    ///
    /// See [`OllamaClient::new`].
    pub fn from_settings(settings: &Settings) -> Result<Self, GenerationError> {
        Self::new(
            settings.api_url.clone(),
            settings.request_timeout(),
            settings.retry.clone(),
        )
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<String, AttemptError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status(status.as_u16(), body));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Timeout
            } else {
                AttemptError::Decode(e.to_string())
            }
        })?;
        Ok(body.response)
    }
}

fn classify_transport(err: reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        AttemptError::Timeout
    } else {
        AttemptError::Connect(err.to_string())
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            temperature = request.temperature(),
            prompt_chars = request.prompt.len(),
            "Sending generation request"
        );

        let made = AtomicUsize::new(0);
        let result = with_retry(
            &self.retry,
            &request.model,
            |attempt| {
                made.store(attempt + 1, Ordering::Relaxed);
                self.attempt(request)
            },
            AttemptError::is_retryable,
        )
        .await;
        let attempts = made.load(Ordering::Relaxed);

        match result {
            Ok(text) => {
                debug!(model = %request.model, response_chars = text.len(), "Generation completed");
                Ok(text)
            }
            Err(AttemptError::Timeout) => Err(GenerationError::Timeout { attempts }),
            Err(AttemptError::Connect(message)) => Err(GenerationError::Unavailable {
                endpoint: self.endpoint.clone(),
                attempts,
                message,
            }),
            Err(AttemptError::Status(status, message)) if RETRYABLE_STATUS.contains(&status) => {
                Err(GenerationError::Unavailable {
                    endpoint: self.endpoint.clone(),
                    attempts,
                    message: format!("HTTP {status}: {message}"),
                })
            }
            Err(AttemptError::Status(status, message)) => {
                Err(GenerationError::Rejected { status, message })
            }
            Err(AttemptError::Decode(message)) => {
                Err(GenerationError::Rejected { status: 0, message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves every connection with the same status line and body, counting requests.
    async fn fixed_status_server(
        status: &'static str,
        body: &'static str,
    ) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}/api/generate"), hits)
    }

    #[test]
    fn test_status_retry_classification() {
        assert!(AttemptError::Status(503, String::new()).is_retryable());
        assert!(AttemptError::Status(429, String::new()).is_retryable());
        assert!(!AttemptError::Status(400, String::new()).is_retryable());
        assert!(!AttemptError::Decode("eof".to_string()).is_retryable());
        assert!(AttemptError::Timeout.is_retryable());
    }

    #[test]
    fn test_response_without_field_is_empty() {
        let body: GenerateResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert_eq!(body.response, "");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let retry = RetryConfig::new().with_max_attempts(2).with_base_delay_ms(1);
        // Port 9 (discard) on localhost is essentially never listening.
        let client =
            OllamaClient::new("http://127.0.0.1:9/api/generate", Duration::from_secs(2), retry)
                .unwrap();
        let request = GenerationRequest::new("m", "p", 0.1, 10);

        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Unavailable { attempts: 2, .. } | GenerationError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_persistent_503_exhausts_into_unavailable() {
        let (endpoint, hits) = fixed_status_server("503 Service Unavailable", "busy").await;
        let retry = RetryConfig::new().with_max_attempts(3).with_base_delay_ms(1);
        let client = OllamaClient::new(endpoint, Duration::from_secs(5), retry).unwrap();
        let request = GenerationRequest::new("m", "p", 0.1, 10);

        let err = client.generate(&request).await.unwrap_err();

        match err {
            GenerationError::Unavailable {
                attempts, message, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("503"));
                assert!(message.contains("busy"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_rejected_after_one_attempt() {
        let (endpoint, hits) = fixed_status_server("400 Bad Request", "no model").await;
        let retry = RetryConfig::new().with_max_attempts(3).with_base_delay_ms(1);
        let client = OllamaClient::new(endpoint, Duration::from_secs(5), retry).unwrap();
        let request = GenerationRequest::new("m", "p", 0.1, 10);

        let err = client.generate(&request).await.unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Rejected { status: 400, ref message } if message == "no model"
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reported_attempts_count_requests_made() {
        let (endpoint, hits) = fixed_status_server("502 Bad Gateway", "down").await;
        let retry = RetryConfig::new().with_max_attempts(0).with_base_delay_ms(1);
        let client = OllamaClient::new(endpoint, Duration::from_secs(5), retry).unwrap();
        let request = GenerationRequest::new("m", "p", 0.1, 10);

        let err = client.generate(&request).await.unwrap_err();

        assert!(matches!(err, GenerationError::Unavailable { attempts: 1, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
