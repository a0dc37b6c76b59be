//! Query reformulation ahead of retrieval.
//!
//! With no history the raw query is rewritten for retrieval. With history the
//! model turns the latest question into one that stands on its own, and is
//! told not to answer it.

use crate::error::Result;
use crate::llm::{ChatModel, ChatRequest};
use crate::models::Turn;

const REWRITE_TEMPERATURE: f32 = 0.3;
const CONTEXTUALIZE_TEMPERATURE: f32 = 0.0;

const CONTEXTUALIZE_INSTRUCTION: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question which can \
be understood without the chat history. Do NOT answer the question, just reformulate it if \
needed and otherwise return it as is.";

/// The query sent to retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standalone {
    pub query: String,
    /// Whether chat history was taken into account.
    pub used_history: bool,
}

fn rewrite_prompt(query: &str) -> String {
    format!(
        "You are a helpful AI assistant who rewrites user's queries to improve document retrieval\n\
         Original question: {}\n\
         Rewritten retrieval query:",
        query
    )
}

/// Rewrite a query with no conversational context.
pub async fn rewrite_standalone(model: &dyn ChatModel, query: &str) -> Result<String> {
    let request = ChatRequest::prompt(rewrite_prompt(query), REWRITE_TEMPERATURE);
    let output = model.complete(&request).await?;
    Ok(normalize_or(&output, query))
}

/// Turn `query` into a question that can be understood without `history`.
pub async fn rewrite_with_history(
    model: &dyn ChatModel,
    history: &[Turn],
    query: &str,
) -> Result<String> {
    let mut messages = history.to_vec();
    messages.push(Turn::human(query));
    let request = ChatRequest {
        system: Some(CONTEXTUALIZE_INSTRUCTION.to_string()),
        messages,
        temperature: CONTEXTUALIZE_TEMPERATURE,
    };
    let output = model.complete(&request).await?;
    Ok(normalize_or(&output, query))
}

pub async fn reformulate(
    model: &dyn ChatModel,
    history: &[Turn],
    query: &str,
) -> Result<Standalone> {
    if history.is_empty() {
        Ok(Standalone {
            query: rewrite_standalone(model, query).await?,
            used_history: false,
        })
    } else {
        Ok(Standalone {
            query: rewrite_with_history(model, history, query).await?,
            used_history: true,
        })
    }
}

/// Collapse whitespace runs; fall back to `original` if nothing is left.
fn normalize_or(output: &str, original: &str) -> String {
    let normalized = output.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        original.trim().to_string()
    } else {
        normalized
    }
}
