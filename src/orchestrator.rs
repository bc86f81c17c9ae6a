//! Answer pipeline: retrieval, grounded generation, confidence gate, and
//! the web-search fallback.
//!
//! The flow for a question:
//! 1. retrieve top-k chunks from the vector index
//! 2. generate an answer grounded on those chunks
//! 3. gate the answer on uncertainty markers
//! 4. on a low-confidence (or impossible) knowledge-base answer, search the
//!    web and generate again from the search results
//! 5. label every answer with its provenance
//!
//! Degradations are deliberate: an unreachable index counts as empty
//! retrieval, a failed web search counts as no results. Only total
//! exhaustion of the generation service is an error.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::{Config, ConfidenceConfig};
use crate::generate::{self, ChatMessage, Generator};
use crate::index::IndexManager;
use crate::models::{Answer, AnswerSource, RetrievedChunk};
use crate::websearch::{DuckDuckGo, WebSearch};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions accurately and concisely.";

/// Returned when every stage produced nothing but no service actually
/// failed.
const NO_ANSWER: &str =
    "I couldn't find an answer to that in the knowledge base or through a web search.";

pub struct Orchestrator {
    manager: Arc<IndexManager>,
    generator: Box<dyn Generator>,
    search: Box<dyn WebSearch>,
    confidence: ConfidenceConfig,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        manager: Arc<IndexManager>,
        generator: Box<dyn Generator>,
        search: Box<dyn WebSearch>,
        confidence: ConfidenceConfig,
        top_k: usize,
    ) -> Self {
        Self {
            manager,
            generator,
            search,
            confidence,
            top_k,
        }
    }

    pub fn from_config(config: &Config, manager: Arc<IndexManager>) -> Result<Self> {
        let generator = generate::create_generator(&config.generation)?;
        let search = Box::new(DuckDuckGo::new(config.websearch.clone())?);
        Ok(Self::new(
            manager,
            generator,
            search,
            config.confidence.clone(),
            config.index.top_k,
        ))
    }

    /// Answer a question, labelling the result with its provenance.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let retrieved = match self.manager.retrieve(question, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "retrieval failed, treating as empty");
                Vec::new()
            }
        };
        info!(chunks = retrieved.len(), "retrieved context");

        let kb_context = build_context(&retrieved);
        let mut kb_answer = None;
        let mut generation_failed = false;

        if let Some(context) = &kb_context {
            match self
                .generator
                .generate(&grounded_prompt(context, question))
                .await
            {
                Ok(text) => {
                    if !self.is_low_confidence(&text) {
                        return Ok(Answer {
                            text,
                            source: AnswerSource::KnowledgeBase,
                        });
                    }
                    info!("low-confidence answer, falling back to web search");
                    kb_answer = Some(text);
                }
                Err(e) => {
                    warn!(error = %e, "grounded generation failed");
                    generation_failed = true;
                }
            }
        }

        let web_results = match self.search.search(question).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "web search failed, treating as no results");
                None
            }
        };

        if let Some(results) = web_results {
            match self
                .generator
                .generate(&web_prompt(&results, kb_context.as_deref(), question))
                .await
            {
                Ok(text) => {
                    return Ok(Answer {
                        text,
                        source: AnswerSource::WebSearch,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "web-grounded generation failed");
                    generation_failed = true;
                }
            }
        }

        // The low-confidence answer is still better than nothing.
        if let Some(text) = kb_answer {
            return Ok(Answer {
                text,
                source: AnswerSource::KnowledgeBase,
            });
        }
        if generation_failed {
            anyhow::bail!("generation service unavailable");
        }
        Ok(Answer {
            text: NO_ANSWER.to_string(),
            source: AnswerSource::WebSearch,
        })
    }

    /// Substring heuristic over the lowercased answer. Markers come from
    /// configuration; an empty marker list disables the gate.
    fn is_low_confidence(&self, answer: &str) -> bool {
        let lowered = answer.to_lowercase();
        self.confidence
            .uncertainty_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }
}

fn build_context(retrieved: &[RetrievedChunk]) -> Option<String> {
    if retrieved.is_empty() {
        return None;
    }
    Some(
        retrieved
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

fn grounded_prompt(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Use the following pieces of context to answer the question at the end. \
             If you don't know the answer, just say that you don't know, don't try \
             to make up an answer.\n\nContext:\n{}\n\nQuestion: {}",
            context, question
        )),
    ]
}

fn web_prompt(results: &str, kb_context: Option<&str>, question: &str) -> Vec<ChatMessage> {
    let mut prompt = format!(
        "Answer the question based ONLY on the provided internet search results. \
         If the results do not contain the answer, say so.\n\nSearch results:\n{}",
        results
    );
    if let Some(context) = kb_context {
        prompt.push_str(&format!("\n\nAdditional background:\n{}", context));
    }
    prompt.push_str(&format!("\n\nQuestion: {}", question));
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)]
}
