//! Retrieval-augmented answer generation.
//!
//! One chat request runs these stages in order, each a separate function
//! over typed values:
//!
//! ```text
//! memory.load ─▶ reformulate ─▶ Standalone
//!                                  │ index.search (MMR)
//!                                  ▼
//!                              Retrieved ─▶ assemble_context ─▶ AssembledContext
//!                                                                  │ synthesize
//!                                                                  ▼
//!                                              answer + sources ─▶ memory.save
//! ```
//!
//! The whole request holds the session's lock, so two requests in one
//! session see each other's turns in order.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::llm::{ChatModel, ChatRequest};
use crate::memory::ChatMemory;
use crate::models::{ChatAnswer, RetrievedChunk, SessionKey, Turn};
use crate::reformulate::{self, Standalone};
use crate::search::SearchStrategy;

const SYNTHESIS_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub k: usize,
    pub fetch_k: usize,
    pub mmr_lambda: f32,
    pub max_context_chars: Option<usize>,
    pub institution: String,
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            k: config.retrieval.k,
            fetch_k: config.retrieval.fetch_k,
            mmr_lambda: config.retrieval.mmr_lambda,
            max_context_chars: config.retrieval.max_context_chars,
            institution: config.assistant.institution.clone(),
        }
    }

    fn strategy(&self) -> SearchStrategy {
        SearchStrategy::Mmr {
            fetch_k: self.fetch_k,
            lambda: self.mmr_lambda,
        }
    }
}

/// Chunks retrieved for a standalone query.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub standalone: Standalone,
    pub chunks: Vec<RetrievedChunk>,
}

/// The context blob handed to the model and the chunks it contains.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub text: String,
    pub used: Vec<RetrievedChunk>,
}

impl AssembledContext {
    /// Distinct sources of the chunks in the context.
    pub fn sources(&self) -> BTreeSet<String> {
        self.used
            .iter()
            .map(|c| c.metadata.source.clone())
            .collect()
    }
}

/// Join chunk contents with blank lines, in retrieval order.
///
/// With a `max_chars` budget, stops before the first chunk that would
/// exceed it; the first chunk is always kept.
pub fn assemble_context(chunks: Vec<RetrievedChunk>, max_chars: Option<usize>) -> AssembledContext {
    let mut context = AssembledContext::default();
    for chunk in chunks {
        let separator = if context.used.is_empty() { 0 } else { 2 };
        let next_len = context.text.len() + separator + chunk.content.len();
        if let Some(limit) = max_chars {
            if !context.used.is_empty() && next_len > limit {
                break;
            }
        }
        if separator > 0 {
            context.text.push_str("\n\n");
        }
        context.text.push_str(&chunk.content);
        context.used.push(chunk);
    }
    context
}

pub fn system_prompt(institution: &str, context: &str) -> String {
    format!(
        "You are a helpful and knowledgeable AI assistant. \
         Use only the information provided in the context to respond accurately and concisely \
         to the input question or request. \
         The context exclusively pertains to {}. \
         If the context does not include enough information, politely indicate that.\n\n\
         Context:\n{}",
        institution, context
    )
}

pub struct Generator {
    model: Arc<dyn ChatModel>,
    settings: GenerationSettings,
}

impl Generator {
    pub fn new(model: Arc<dyn ChatModel>, settings: GenerationSettings) -> Self {
        Self { model, settings }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Answer `query` in the session `key` and record the exchange.
    pub async fn generate(
        &self,
        index: &VectorIndex,
        memory: &ChatMemory,
        key: &SessionKey,
        query: &str,
    ) -> Result<ChatAnswer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".into()));
        }
        let started = Instant::now();

        let session = memory.lock_session(key).await;
        let history = session.load().await?;

        let standalone = reformulate::reformulate(self.model.as_ref(), &history, query).await?;
        tracing::debug!(session_key = %key, standalone = %standalone.query, "query reformulated");

        let retrieved = self.retrieve(index, standalone).await?;
        let context = assemble_context(retrieved.chunks, self.settings.max_context_chars);
        let answer = self.synthesize(&history, &context, query).await?;
        let sources = context.sources();

        session.save(query, &answer).await?;

        tracing::info!(
            session_key = %key,
            chunks = context.used.len(),
            sources = sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answer generated"
        );

        Ok(ChatAnswer {
            answer,
            sources,
            standalone_query: retrieved.standalone.query,
        })
    }

    pub async fn retrieve(&self, index: &VectorIndex, standalone: Standalone) -> Result<Retrieved> {
        let chunks = index
            .search(&standalone.query, self.settings.k, self.settings.strategy())
            .await?;
        Ok(Retrieved { standalone, chunks })
    }

    /// One grounded completion: system prompt with the context, the history
    /// as turns, then the user's question.
    pub async fn synthesize(
        &self,
        history: &[Turn],
        context: &AssembledContext,
        query: &str,
    ) -> Result<String> {
        let mut messages = history.to_vec();
        messages.push(Turn::human(query));
        let request = ChatRequest {
            system: Some(system_prompt(&self.settings.institution, &context.text)),
            messages,
            temperature: SYNTHESIS_TEMPERATURE,
        };
        let answer = self.model.complete(&request).await?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn retrieved(source: &str, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("{}-{}", source, content.len()),
            content: content.to_string(),
            metadata: DocumentMetadata::new(source, "pdf"),
            score: 0.5,
        }
    }

    #[test]
    fn context_joins_in_order() {
        let ctx = assemble_context(
            vec![
                retrieved("about.pdf", "first"),
                retrieved("fees.pdf", "second"),
                retrieved("about.pdf", "third"),
            ],
            None,
        );
        assert_eq!(ctx.text, "first\n\nsecond\n\nthird");
        assert_eq!(
            ctx.sources().into_iter().collect::<Vec<_>>(),
            vec!["about.pdf", "fees.pdf"]
        );
    }

    #[test]
    fn budget_excludes_later_chunks_from_sources() {
        let ctx = assemble_context(
            vec![
                retrieved("about.pdf", "aaaaaaaaaa"),
                retrieved("fees.pdf", "bbbbbbbbbb"),
            ],
            Some(15),
        );
        assert_eq!(ctx.text, "aaaaaaaaaa");
        assert_eq!(ctx.used.len(), 1);
        assert!(!ctx.sources().contains("fees.pdf"));
    }

    #[test]
    fn first_chunk_always_included() {
        let ctx = assemble_context(vec![retrieved("big.pdf", "0123456789")], Some(3));
        assert_eq!(ctx.used.len(), 1);
    }

    #[test]
    fn empty_retrieval_gives_empty_context() {
        let ctx = assemble_context(Vec::new(), Some(100));
        assert!(ctx.text.is_empty());
        assert!(ctx.sources().is_empty());
    }

    #[test]
    fn system_prompt_names_institution_and_context() {
        let prompt = system_prompt("IIIT Bangalore (IIITB)", "Hostel fee is 1 lakh.");
        assert!(prompt.contains("exclusively pertains to IIIT Bangalore (IIITB)"));
        assert!(prompt.contains("politely indicate"));
        assert!(prompt.ends_with("Context:\nHostel fee is 1 lakh."));
    }
}
