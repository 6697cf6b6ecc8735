//! Test-only mock LLM provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::provider::{ChatOptions, LlmProvider, Message};

type EmbedFn = dyn Fn(&str) -> Vec<f32> + Send + Sync;

/// Scripted provider for tests: pops queued responses in order, falls back
/// to `default_response`, and counts every chat/embed call so tests can
/// assert that a code path made exactly N provider calls.
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    embed_fn: Option<Arc<EmbedFn>>,
    pub fail_chat: bool,
    chat_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            embed_fn: None,
            fail_chat: false,
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("default_response", &self.default_response)
            .field("fail_chat", &self.fail_chat)
            .finish_non_exhaustive()
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    /// Enable embeddings with a fixed zero vector of dimension 8.
    #[must_use]
    pub fn with_embeddings(self) -> Self {
        self.with_embed_fn(|_| vec![0.0; 8])
    }

    /// Enable embeddings with a caller-supplied deterministic embedder.
    #[must_use]
    pub fn with_embed_fn(mut self, f: impl Fn(&str) -> Vec<f32> + Send + Sync + 'static) -> Self {
        self.embed_fn = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

impl LlmProvider for MockProvider {
    async fn chat(
        &self,
        _messages: &[Message],
        _options: ChatOptions,
    ) -> Result<String, crate::LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_chat {
            return Err(crate::LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, crate::LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        match &self.embed_fn {
            Some(f) => Ok(texts.iter().map(|t| f(t)).collect()),
            None => Err(crate::LlmError::EmbedUnsupported { provider: "mock" }),
        }
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
