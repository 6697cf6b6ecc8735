//! LLM provider abstraction: chat completions and text embeddings.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod tiered;

pub use error::LlmError;
pub use provider::LlmProvider;
