//! Prompt builders for the retrieval agent. Each returns a
//! (system, user) pair; multi-item outputs are delimited with the same
//! separator token the description generator reserves.

use quarry_index::describe::{BODY_END, BODY_START, SEP_TOKEN};
use quarry_llm::tiered::estimate_tokens;

/// Estimated token cost of a (system, user) prompt pair.
#[must_use]
pub fn prompt_tokens(system: &str, user: &str) -> usize {
    estimate_tokens(system) + estimate_tokens(user)
}

/// Summarize a README with the user's question as the lens.
#[must_use]
pub fn readme_summarization(readme: &str, question: &str) -> (String, String) {
    let system = "You summarize project README files. Keep only what helps answer \
                  the user's question: purpose, architecture, key components, and \
                  terminology. Be concise."
        .to_owned();
    let user = format!("Question: {question}\n\nREADME:\n{readme}");
    (system, user)
}

/// Rewrite the raw question into a structured query plus the desired shape
/// of the final answer.
#[must_use]
pub fn question_enhancement(question: &str, readme_summary: &str) -> (String, String) {
    let system = "You rewrite questions about a codebase into a precise, structured \
                  query. State what to find and describe the expected output format \
                  of a good answer. Output the rewritten query only."
        .to_owned();
    let user = format!("Project summary:\n{readme_summary}\n\nQuestion: {question}");
    (system, user)
}

/// Ask for up to `n` short search sentences, separator-delimited.
#[must_use]
pub fn search_sentences(enhanced_query: &str, readme_summary: &str, n: usize) -> (String, String) {
    let system = format!(
        "You write short search sentences for a semantic code index. Each sentence \
         describes one piece of functionality likely to exist in the codebase. \
         Output at most {n} sentences separated by {SEP_TOKEN}, nothing else."
    );
    let user = format!("Project summary:\n{readme_summary}\n\nQuery:\n{enhanced_query}");
    (system, user)
}

/// Final answer generation over a batch of retrieved code bodies.
#[must_use]
pub fn answer_generation(
    readme_summary: &str,
    question: &str,
    bodies: &[String],
) -> (String, String) {
    let system = "You answer questions about a codebase. Ground every claim in the \
                  provided code context; say so when the context is insufficient."
        .to_owned();

    let mut user = format!("Project summary:\n{readme_summary}\n\nQuestion: {question}\n\nCode context:\n");
    for body in bodies {
        user.push_str(BODY_START);
        user.push('\n');
        user.push_str(body);
        user.push('\n');
        user.push_str(BODY_END);
        user.push('\n');
    }
    (system, user)
}
