//! Prompt-size-based routing between a small and a large completion model.

use crate::error::LlmError;
use crate::provider::{ChatOptions, LlmProvider, Message};

/// Estimate token count using the chars/4 heuristic.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Estimate the total token count of a message list.
#[must_use]
pub fn estimate_message_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

/// Routes each completion to the cheap small-context model when the prompt
/// fits, and to the large-context model otherwise. Embeddings always go
/// through the small provider.
#[derive(Debug, Clone)]
pub struct TieredProvider<P> {
    small: P,
    large: P,
    small_limit: usize,
    large_limit: usize,
}

impl<P: LlmProvider> TieredProvider<P> {
    #[must_use]
    pub fn new(small: P, large: P, small_limit: usize, large_limit: usize) -> Self {
        Self {
            small,
            large,
            small_limit,
            large_limit,
        }
    }

    /// Token capacity of the small tier. Batch ceilings derive from this.
    #[must_use]
    pub fn small_limit(&self) -> usize {
        self.small_limit
    }

    /// Token capacity of the large tier, the hard cap on any single prompt.
    #[must_use]
    pub fn large_limit(&self) -> usize {
        self.large_limit
    }

    /// Pick the tier for a prompt of `estimated_tokens`.
    #[must_use]
    pub fn pick(&self, estimated_tokens: usize) -> &P {
        if estimated_tokens < self.small_limit {
            &self.small
        } else {
            &self.large
        }
    }
}

impl<P: LlmProvider> LlmProvider for TieredProvider<P> {
    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<String, LlmError> {
        let tokens = estimate_message_tokens(messages);
        let tier = self.pick(tokens);
        tracing::debug!(tokens, tier = tier.name(), "routing completion");
        tier.chat(messages, options).await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.small.embed(texts).await
    }

    fn name(&self) -> &str {
        "tiered"
    }
}

#[allow(dead_code)]
fn _assert_chat_send<P: LlmProvider>(llm: &TieredProvider<P>) {
    fn is_send<T: Send>(_: T) {}
    is_send(async move {
        let _ = llm.chat(&[], ChatOptions::default()).await;
    });
}
