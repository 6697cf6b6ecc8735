//! The multi-stage retrieval agent.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use quarry_index::budget::pack_batches;
use quarry_index::describe::SEP_TOKEN;
use quarry_index::{CodeDb, CodeRecord, ScoredRecord};
use quarry_llm::provider::{ChatOptions, LlmProvider, Message};
use quarry_llm::tiered::{TieredProvider, estimate_tokens};

use crate::error::{AgentError, Result};
use crate::prompt;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Stages of one answer run, in execution order. Surfaced through the
/// [`Progress`] sink so pollers can show where a query stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStage {
    GenReadme,
    EnhancePrompt,
    GenCodeContext,
    Answering,
}

/// Receives stage transitions; the worker wires this to the query's status
/// record in the coordination store.
pub trait Progress: Send + Sync {
    fn stage(&self, stage: AgentStage) -> BoxFuture<'_, Result<()>>;
}

/// Progress sink that discards transitions (CLI one-shots, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl Progress for NoopProgress {
    fn stage(&self, _stage: AgentStage) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Tunables for one agent run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum search sentences generated from the enhanced query.
    pub max_search_sentences: usize,
    /// Nearest neighbors fetched per search sentence.
    pub per_sentence_k: usize,
    /// Cap on merged, deduplicated hits kept for answering.
    pub retrieval_cap: usize,
    /// Concurrent answer-generation calls when context spans batches.
    pub answer_parallelism: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_search_sentences: 8,
            per_sentence_k: 2,
            retrieval_cap: 24,
            answer_parallelism: 8,
        }
    }
}

/// Condensed hit provenance carried in the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitSummary {
    pub score: f32,
    pub path: String,
    pub name: String,
    pub description: String,
}

/// Everything one answer run produced, persisted as the query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerReport {
    pub answers: Vec<String>,
    pub summarized_readme: String,
    pub enhanced_query: String,
    pub search_sentences: Vec<String>,
    pub hits: Vec<HitSummary>,
    pub context: Vec<HitSummary>,
}

/// Runs the retrieval state machine for one question.
pub struct RetrievalAgent<P: LlmProvider + Clone> {
    codedb: CodeDb<P>,
    llm: TieredProvider<P>,
    config: AgentConfig,
}

impl<P: LlmProvider + Clone> RetrievalAgent<P> {
    #[must_use]
    pub fn new(codedb: CodeDb<P>, llm: TieredProvider<P>, config: AgentConfig) -> Self {
        Self {
            codedb,
            llm,
            config,
        }
    }

    /// Answer `question` against the indexed repository.
    ///
    /// # Errors
    ///
    /// LLM transport and search failures propagate and abort the run; a
    /// missing README does not.
    pub async fn answer(
        &self,
        readme: Option<&str>,
        question: &str,
        progress: &dyn Progress,
    ) -> Result<AnswerReport> {
        progress.stage(AgentStage::GenReadme).await?;
        let summarized_readme = match readme {
            Some(text) if !text.trim().is_empty() => {
                let (system, user) = prompt::readme_summarization(text, question);
                self.chat(&system, &user, ChatOptions::default()).await?
            }
            _ => String::new(),
        };

        progress.stage(AgentStage::EnhancePrompt).await?;
        let (system, user) = prompt::question_enhancement(question, &summarized_readme);
        let enhanced_query = self.chat(&system, &user, ChatOptions::default()).await?;

        progress.stage(AgentStage::GenCodeContext).await?;
        let (system, user) = prompt::search_sentences(
            &enhanced_query,
            &summarized_readme,
            self.config.max_search_sentences,
        );
        let response = self.chat(&system, &user, ChatOptions::default()).await?;
        let search_sentences: Vec<String> = response
            .split(SEP_TOKEN)
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .take(self.config.max_search_sentences)
            .collect();

        let searches = search_sentences
            .iter()
            .map(|sentence| self.codedb.search(sentence, self.config.per_sentence_k));
        let mut merged = Vec::new();
        for hits in futures::future::join_all(searches).await {
            merged.extend(hits?);
        }
        let hits = merge_hits(merged, self.config.retrieval_cap);
        tracing::debug!(
            sentences = search_sentences.len(),
            hits = hits.len(),
            "retrieval complete"
        );

        progress.stage(AgentStage::Answering).await?;
        let context: Vec<CodeRecord> = hits.iter().map(|h| h.record.clone()).collect();
        let answers = self
            .generate_answers(&summarized_readme, question, &context)
            .await?;

        Ok(AnswerReport {
            answers,
            summarized_readme,
            enhanced_query,
            search_sentences,
            hits: hits.iter().map(hit_summary).collect(),
            context: hits.iter().map(hit_summary).collect(),
        })
    }

    /// Pack retrieved bodies against the answer prompt's overhead and fan
    /// the completions out; fragments come back in batch order. A single
    /// batch runs at reduced temperature for determinism.
    async fn generate_answers(
        &self,
        summarized_readme: &str,
        question: &str,
        context: &[CodeRecord],
    ) -> Result<Vec<String>> {
        let (system, user) = prompt::answer_generation(summarized_readme, question, &[]);
        let overhead = prompt::prompt_tokens(&system, &user);
        let ceiling = self.llm.small_limit().saturating_sub(overhead);

        let batches = pack_batches(context.iter().collect::<Vec<_>>(), ceiling, |r| {
            estimate_tokens(&r.body)
        });

        if batches.len() == 1 {
            let bodies: Vec<String> = batches[0].iter().map(|r| r.body.clone()).collect();
            let (system, user) = prompt::answer_generation(summarized_readme, question, &bodies);
            let answer = self
                .chat(&system, &user, ChatOptions::deterministic())
                .await?;
            return Ok(vec![answer]);
        }

        let fragments: Vec<Result<String>> = futures::stream::iter(batches.iter().map(|batch| {
            let bodies: Vec<String> = batch.iter().map(|r| r.body.clone()).collect();
            let (system, user) = prompt::answer_generation(summarized_readme, question, &bodies);
            async move { self.chat(&system, &user, ChatOptions::default()).await }
        }))
        .buffered(self.config.answer_parallelism.max(1))
        .collect()
        .await;

        fragments.into_iter().collect()
    }

    async fn chat(&self, system: &str, user: &str, options: ChatOptions) -> Result<String> {
        let messages = [Message::system(system), Message::user(user)];
        Ok(self.llm.chat(&messages, options).await?)
    }
}

fn hit_summary(hit: &ScoredRecord) -> HitSummary {
    HitSummary {
        score: hit.score,
        path: hit.record.path.clone(),
        name: hit.record.name.clone(),
        description: hit.record.description.clone(),
    }
}

/// Sort merged hits by score descending, keep the best-scoring hit per
/// `(path, name)`, and truncate to `cap`.
#[must_use]
pub fn merge_hits(mut hits: Vec<ScoredRecord>, cap: usize) -> Vec<ScoredRecord> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut seen = HashSet::new();
    hits.retain(|h| seen.insert((h.record.path.clone(), h.record.name.clone())));
    hits.truncate(cap);
    hits
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use quarry_index::{RecordKind, codedb::extract_records};
    use quarry_llm::mock::MockProvider;
    use quarry_store::memory_vector::InMemoryVectorStore;

    use super::*;

    fn scored(path: &str, name: &str, score: f32) -> ScoredRecord {
        ScoredRecord {
            score,
            record: CodeRecord {
                kind: RecordKind::Function,
                path: path.into(),
                name: name.into(),
                body: format!("def {name}(): pass"),
                description: String::new(),
            },
        }
    }

    #[test]
    fn merge_hits_keeps_highest_score_per_identity() {
        let hits = vec![
            scored("a.py", "f", 0.4),
            scored("a.py", "f", 0.9),
            scored("b.py", "g", 0.6),
        ];
        let merged = merge_hits(hits, 10);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].record.name, "f");
        assert!((merged[0].score - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn merge_hits_scores_non_increasing() {
        let hits = vec![
            scored("a.py", "f", 0.2),
            scored("b.py", "g", 0.8),
            scored("c.py", "h", 0.5),
        ];
        let merged = merge_hits(hits, 10);
        for pair in merged.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn merge_hits_truncates_to_cap() {
        let hits = (0..10)
            .map(|i| scored("a.py", &format!("f{i}"), 1.0 - 0.05 * i as f32))
            .collect();
        assert_eq!(merge_hits(hits, 3).len(), 3);
    }

    struct RecordingProgress(Arc<Mutex<Vec<AgentStage>>>);

    impl Progress for RecordingProgress {
        fn stage(&self, stage: AgentStage) -> BoxFuture<'_, Result<()>> {
            let log = Arc::clone(&self.0);
            Box::pin(async move {
                log.lock().unwrap().push(stage);
                Ok(())
            })
        }
    }

    fn keyword_embedder(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        ["post", "request", "resource", "file", "config"]
            .iter()
            .map(|kw| if lower.contains(kw) { 1.0 } else { 0.01 })
            .collect()
    }

    async fn indexed_agent(responses: Vec<String>) -> RetrievalAgent<MockProvider> {
        let small = MockProvider::with_responses(responses).with_embed_fn(keyword_embedder);
        let llm = TieredProvider::new(small, MockProvider::default(), 30_000, 100_000);

        let files = vec![
            quarry_index::chunker::parse_file(
                "def create_item():\n    pass\n\ndef load_config():\n    pass\n",
                "app.py",
            )
            .unwrap(),
        ];
        let codedb = CodeDb::new(
            Arc::new(InMemoryVectorStore::new()),
            llm.clone(),
            "octo/webapp",
        );
        codedb.build(extract_records(&files), 2).await.unwrap();
        RetrievalAgent::new(codedb, llm, AgentConfig::default())
    }

    fn scripted_run() -> Vec<String> {
        vec![
            // Index build: one description per record.
            format!("handles POST requests{SEP_TOKEN}loads config files"),
            // Agent: readme summary, enhanced query, search sentences, answer.
            "a web app for items".into(),
            "find the POST handler; answer with file references".into(),
            format!("handles POST requests{SEP_TOKEN}reads the config file"),
            "create_item handles POST requests.".into(),
        ]
    }

    #[tokio::test]
    async fn stages_fire_in_order() {
        let agent = indexed_agent(scripted_run()).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        agent
            .answer(
                Some("# webapp"),
                "where is POST handled?",
                &RecordingProgress(Arc::clone(&log)),
            )
            .await
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                AgentStage::GenReadme,
                AgentStage::EnhancePrompt,
                AgentStage::GenCodeContext,
                AgentStage::Answering,
            ]
        );
    }

    #[tokio::test]
    async fn answer_report_carries_provenance() {
        let agent = indexed_agent(scripted_run()).await;
        let report = agent
            .answer(Some("# webapp"), "where is POST handled?", &NoopProgress)
            .await
            .unwrap();

        assert_eq!(report.answers, vec!["create_item handles POST requests."]);
        assert_eq!(report.summarized_readme, "a web app for items");
        assert_eq!(report.search_sentences.len(), 2);
        assert!(!report.hits.is_empty());
        assert!(report.hits.iter().any(|h| h.name == "create_item"));
        for pair in report.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn missing_readme_skips_summarization_call() {
        // Without a readme the first scripted response becomes the
        // enhanced query instead.
        let mut responses = scripted_run();
        responses.remove(1);
        let agent = indexed_agent(responses).await;
        let report = agent
            .answer(None, "where is POST handled?", &NoopProgress)
            .await
            .unwrap();
        assert!(report.summarized_readme.is_empty());
        assert!(!report.answers.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let small = MockProvider::failing().with_embed_fn(keyword_embedder);
        let llm = TieredProvider::new(small, MockProvider::default(), 30_000, 100_000);
        let codedb = CodeDb::new(Arc::new(InMemoryVectorStore::new()), llm.clone(), "o/r");
        let agent = RetrievalAgent::new(codedb, llm, AgentConfig::default());
        assert!(
            agent
                .answer(Some("readme"), "question", &NoopProgress)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn multi_batch_context_concatenates_fragments_in_order() {
        // Index with a roomy budget, then answer under a tiny one so the
        // two retrieved bodies land in separate answer batches.
        let build_mock = MockProvider::with_responses(vec![format!("d1{SEP_TOKEN}d2")])
            .with_embed_fn(keyword_embedder);
        let build_llm = TieredProvider::new(build_mock.clone(), build_mock, 30_000, 100_000);

        let source = format!(
            "def create_item():\n    x = \"{}\"\n\ndef load_config():\n    y = \"{}\"\n",
            "p".repeat(400),
            "c".repeat(400)
        );
        let files = vec![quarry_index::chunker::parse_file(&source, "app.py").unwrap()];
        let codedb = CodeDb::new(
            Arc::new(InMemoryVectorStore::new()),
            build_llm,
            "octo/webapp",
        );
        codedb.build(extract_records(&files), 1).await.unwrap();

        let answer_mock = MockProvider::with_responses(vec![
            "summary".into(),
            "enhanced".into(),
            format!("post things{SEP_TOKEN}config things"),
            "fragment one".into(),
            "fragment two".into(),
        ])
        .with_embed_fn(keyword_embedder);
        let answer_llm = TieredProvider::new(answer_mock.clone(), answer_mock, 120, 100_000);

        let agent = RetrievalAgent::new(
            codedb,
            answer_llm,
            AgentConfig {
                answer_parallelism: 1,
                ..AgentConfig::default()
            },
        );
        let report = agent
            .answer(Some("# webapp"), "what does this do?", &NoopProgress)
            .await
            .unwrap();
        assert_eq!(report.answers, vec!["fragment one", "fragment two"]);
    }
}
