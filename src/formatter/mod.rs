//! Response Formatter
//!
//! Second model call. Turns executed rows into a stakeholder answer plus a
//! dense context summary for later turns. Never fails: a failed call falls
//! back to the deterministic renderer.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::llm::LanguageModel;
use crate::memory::{TokenManager, FORMATTING_RESERVED_TOKENS};
use crate::models::{FormattedAnswer, Intent, Record};

pub mod fallback;
pub mod prompt;

pub use fallback::{error_response, fallback_summary, no_data_message, parse_formatted, render_rows};
pub use prompt::{build_formatting_prompt, FORMATTING_SYSTEM, MAX_PROMPT_ROWS, SUMMARY_DELIMITER};

pub struct ResponseFormatter {
    model: Arc<dyn LanguageModel>,
    token_manager: TokenManager,
}

impl ResponseFormatter {
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
    pub async fn format(
        &self,
        query: &str,
        sql: &str,
        rows: &[Record],
        intent: Intent,
        history: &[String],
    ) -> FormattedAnswer {
        let started = Instant::now();
        let history_block = self.token_manager.select(history, FORMATTING_RESERVED_TOKENS);
        let prompt = build_formatting_prompt(query, sql, rows, intent, &history_block);

        debug!(
            model = self.model.name(),
            row_count = rows.len(),
            prompt_tokens = self.token_manager.estimate(&prompt),
            "Formatting response"
        );

        match self.model.complete(FORMATTING_SYSTEM, &prompt).await {
            Ok(raw) if !raw.trim().is_empty() => {
                let mut answer = parse_formatted(&raw, query, intent);
                if answer.answer_text.is_empty() {
                    warn!("Formatting reply had no answer before the summary, rendering rows directly");
                    answer.answer_text = render_rows(rows, intent);
                }
                info!(
                    answer_chars = answer.answer_text.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Response formatted"
                );
                answer
            }
            Ok(_) => {
                warn!("Formatting reply was empty, rendering rows directly");
                self.render_fallback(query, rows, intent)
            }
            Err(e) => {
                warn!(error = %e, "Formatting call failed, rendering rows directly");
                self.render_fallback(query, rows, intent)
            }
        }
    }

    fn render_fallback(&self, query: &str, rows: &[Record], intent: Intent) -> FormattedAnswer {
        FormattedAnswer {
            answer_text: render_rows(rows, intent),
            context_summary: fallback_summary(query, intent),
            raw_response: None,
        }
    }
}
