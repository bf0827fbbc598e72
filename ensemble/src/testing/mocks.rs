//! Scripted generation clients for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::generation::{GenerationClient, GenerationError, GenerationRequest};

/// What a [`ScriptedClient`] answers once its queue is drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Always the same text.
    Constant(String),
    /// The prompt, verbatim.
    EchoPrompt,
    /// The model name followed by the call number, so every call differs.
    Numbered,
}

/// A generation client that replays scripted responses and records requests.
///
/// Queued responses are consumed first, in order. When the queue is empty
/// the fallback [`ScriptedReply`] decides the answer. Failures can be pinned
/// to a specific zero-based call index.
#[derive(Debug)]
pub struct ScriptedClient {
    queue: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: ScriptedReply,
    failures: Mutex<HashMap<usize, GenerationError>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::with_fallback(ScriptedReply::Numbered)
    }
}

impl ScriptedClient {
    /// Creates a client that answers every call with distinct text.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that answers every call with `text`.
    #[must_use]
    pub fn constant(text: impl Into<String>) -> Self {
        Self::with_fallback(ScriptedReply::Constant(text.into()))
    }

    /// Creates a client that echoes each prompt back.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_fallback(ScriptedReply::EchoPrompt)
    }

    /// Creates a client with the given fallback.
    #[must_use]
    pub fn with_fallback(fallback: ScriptedReply) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            failures: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues responses to return before falling back.
    #[must_use]
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for response in responses {
            self.push_response(response);
        }
        self
    }

    /// Makes the call at `index` (zero-based) fail with `error`.
    #[must_use]
    pub fn fail_on_call(self, index: usize, error: GenerationError) -> Self {
        self.failures.lock().insert(index, error);
        self
    }

    /// Appends one response to the queue.
    pub fn push_response(&self, response: impl Into<String>) {
        self.queue.lock().push_back(Ok(response.into()));
    }

    /// Appends one failure to the queue.
    pub fn push_error(&self, error: GenerationError) {
        self.queue.lock().push_back(Err(error));
    }

    /// Returns the number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Returns every prompt received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.prompt.clone()).collect()
    }

    /// Returns the models addressed, in call order.
    #[must_use]
    pub fn models(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.model.clone()).collect()
    }

    /// Clears recorded requests and pinned failures.
    pub fn reset(&self) {
        self.requests.lock().clear();
        self.failures.lock().clear();
    }

    fn fallback_reply(&self, request: &GenerationRequest, index: usize) -> String {
        match &self.fallback {
            ScriptedReply::Constant(text) => text.clone(),
            ScriptedReply::EchoPrompt => request.prompt.clone(),
            ScriptedReply::Numbered => format!("{} output #{}", request.model, index + 1),
        }
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let index = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len() - 1
        };

        if let Some(error) = self.failures.lock().remove(&index) {
            return Err(error);
        }
        if let Some(queued) = self.queue.lock().pop_front() {
            return queued;
        }
        Ok(self.fallback_reply(request, index))
    }
}
