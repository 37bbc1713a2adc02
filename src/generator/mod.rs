//! Query Intent & SQL Generator
//!
//! First model call of the pipeline. Turns a question plus recent history
//! into an [`IntentResult`]. Never returns an error: a failed call yields a
//! terminal zero-confidence result and an unparseable reply falls back to
//! the keyword heuristic.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::llm::LanguageModel;
use crate::memory::{TokenManager, GENERATION_RESERVED_TOKENS};
use crate::models::IntentResult;

pub mod heuristic;
pub mod parse;
pub mod prompt;

pub use heuristic::{classify_intent, fallback_intent, looks_like_modification};
pub use parse::{parse_intent_reply, parse_or_fallback};
pub use prompt::{build_generation_prompt, GENERATION_SYSTEM};

/// One generation call, with what was sent and received for persistence.
#[derive(Debug, Clone)]
pub struct Generation {
    pub result: IntentResult,
    pub prompt: String,
    /// Absent when the model call failed
    pub raw_response: Option<String>,
}

pub struct IntentGenerator {
    model: Arc<dyn LanguageModel>,
    token_manager: TokenManager,
}

impl IntentGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            token_manager: TokenManager::default(),
        }
    }

    pub fn with_token_manager(mut self, token_manager: TokenManager) -> Self {
        self.token_manager = token_manager;
        self
    }

    /// `history` holds prior-turn summaries, most recent first.
    pub async fn generate(&self, query: &str, history: &[String]) -> Generation {
        let started = Instant::now();
        let history_block = self.token_manager.select(history, GENERATION_RESERVED_TOKENS);
        let prompt = build_generation_prompt(query, &history_block);

        debug!(
            model = self.model.name(),
            history_entries = history.len(),
            prompt_tokens = self.token_manager.estimate(&prompt),
            "Generating intent and SQL"
        );

        let raw = match self.model.complete(GENERATION_SYSTEM, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Generation call failed");
                return Generation {
                    result: IntentResult::unavailable(&e),
                    prompt,
                    raw_response: None,
                };
            }
        };

        let result = parse_or_fallback(&raw, query);

        info!(
            intent = %result.intent,
            origin = ?result.origin,
            has_sql = result.sql_query.is_some(),
            confidence = result.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Intent resolved"
        );

        Generation {
            result,
            prompt,
            raw_response: Some(raw),
        }
    }
}
