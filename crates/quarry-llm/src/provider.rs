use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling parameters for a single completion call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self { temperature: 0.7 }
    }
}

impl ChatOptions {
    /// Low-temperature options for calls where determinism matters more
    /// than variety (single-batch answer generation).
    #[must_use]
    pub fn deterministic() -> Self {
        Self { temperature: 0.1 }
    }
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response
    /// is invalid.
    fn chat(
        &self,
        messages: &[Message],
        options: ChatOptions,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Embed a batch of texts into fixed-dimension vectors, one per input,
    /// in input order. Deterministic for identical input.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider does not support embeddings or the
    /// call fails.
    fn embed(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    fn name(&self) -> &str;
}
