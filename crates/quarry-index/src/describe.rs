//! Batched description generation: one completion call summarizes every
//! chunk body in a batch, with positional alignment enforced by a reserved
//! separator token.

use quarry_llm::provider::{ChatOptions, LlmProvider, Message};
use quarry_llm::tiered::TieredProvider;

use crate::error::Result;

/// Separator between per-item segments in prompts and responses. Must not
/// otherwise appear in source text; no escaping is performed if it does.
pub const SEP_TOKEN: &str = "<|sep|>";

/// Markers enclosing each code body inside a multi-item prompt.
pub const BODY_START: &str = "<|code|>";
pub const BODY_END: &str = "<|/code|>";

/// Build the (system, user) prompt pair asking for one short description
/// per enclosed body, separated by [`SEP_TOKEN`].
#[must_use]
pub fn summarization_prompt(bodies: &[String]) -> (String, String) {
    let system = format!(
        "You are a code summarization engine. For each code block enclosed in \
         {BODY_START} and {BODY_END}, write one concise description of what it \
         does. Output exactly one description per block, in input order, \
         separated by {SEP_TOKEN}. Output nothing else."
    );

    let mut user = String::new();
    for (i, body) in bodies.iter().enumerate() {
        if i > 0 {
            user.push_str(SEP_TOKEN);
            user.push('\n');
        }
        user.push_str(BODY_START);
        user.push('\n');
        user.push_str(body);
        user.push('\n');
        user.push_str(BODY_END);
        user.push('\n');
    }
    (system, user)
}

/// Estimated token cost of the summarization prompt scaffolding alone.
#[must_use]
pub fn prompt_overhead() -> usize {
    let (system, user) = summarization_prompt(&[]);
    quarry_llm::tiered::estimate_tokens(&system) + quarry_llm::tiered::estimate_tokens(&user)
}

/// Generate one description per body with a single tier-routed completion.
///
/// If the response does not split into exactly `bodies.len()` segments,
/// every body in the batch gets an empty description: a misaligned mapping
/// would silently attribute descriptions to the wrong chunks, which is
/// worse than no descriptions.
///
/// # Errors
///
/// Transport-level provider failures propagate; there is no retry.
pub async fn generate_descriptions<P: LlmProvider>(
    llm: &TieredProvider<P>,
    bodies: &[String],
) -> Result<Vec<String>> {
    if bodies.is_empty() {
        return Ok(Vec::new());
    }

    let (system, user) = summarization_prompt(bodies);
    let messages = [Message::system(system), Message::user(user)];
    let response = llm.chat(&messages, ChatOptions::default()).await?;

    let segments: Vec<String> = response
        .split(SEP_TOKEN)
        .map(|s| s.trim().to_owned())
        .collect();

    if segments.len() == bodies.len() {
        Ok(segments)
    } else {
        tracing::warn!(
            expected = bodies.len(),
            received = segments.len(),
            "description count mismatch, degrading batch to empty descriptions"
        );
        Ok(vec![String::new(); bodies.len()])
    }
}
