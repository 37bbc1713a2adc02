//! Token budgeting for prior-turn summaries
//!
//! Estimates are a length proxy, good enough to keep prompts inside the
//! model's context window. Not suitable for billing.

use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4000;

/// Tokens held back for schema, rules and the query in the generation prompt
pub const GENERATION_RESERVED_TOKENS: usize = 2000;

/// Tokens held back for rows, enum reference and instructions in the formatting prompt
pub const FORMATTING_RESERVED_TOKENS: usize = 2500;

pub const NO_HISTORY: &str = "No previous conversation";

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct TokenBudget {
    pub total_tokens: usize,
    pub reserved_tokens: usize,
    pub available_tokens: usize,
    pub percentage_available: f32,
}

#[derive(Debug, Clone)]
pub struct TokenManager {
    max_context_tokens: usize,
}

impl TokenManager {
    pub fn new(max_context_tokens: usize) -> Self {
        Self { max_context_tokens }
    }

    pub fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }

    /// Roughly four characters per token, rounded up.
    pub fn estimate(&self, text: &str) -> usize {
        (text.chars().count() + 3) / 4
    }

    pub fn available(&self, reserved: usize) -> usize {
        self.max_context_tokens.saturating_sub(reserved)
    }

    pub fn budget(&self, reserved: usize) -> TokenBudget {
        let available = self.available(reserved);
        let percentage_available = if self.max_context_tokens == 0 {
            0.0
        } else {
            available as f32 / self.max_context_tokens as f32 * 100.0
        };

        TokenBudget {
            total_tokens: self.max_context_tokens,
            reserved_tokens: reserved,
            available_tokens: available,
            percentage_available,
        }
    }

    /// Longest most-recent-first prefix of `history` whose estimated cost fits
    /// in the available budget. Items are never truncated.
    pub fn fitting_prefix<'a, S: AsRef<str>>(&self, history: &'a [S], reserved: usize) -> &'a [S] {
        let available = self.available(reserved);
        let mut used = 0;
        let mut count = 0;

        for item in history {
            let cost = self.estimate(item.as_ref());
            if used + cost > available {
                break;
            }
            used += cost;
            count += 1;
        }

        debug!(
            selected = count,
            offered = history.len(),
            used_tokens = used,
            available_tokens = available,
            "History selected within token budget"
        );

        &history[..count]
    }

    /// Format `history` (most recent first) with positional recency labels.
    ///
    /// Never returns an empty string: no history or no room yields an explicit
    /// placeholder.
    pub fn select<S: AsRef<str>>(&self, history: &[S], reserved: usize) -> String {
        if history.is_empty() {
            return NO_HISTORY.to_string();
        }

        let available = self.available(reserved);
        if available == 0 {
            warn!(
                max_tokens = self.max_context_tokens,
                reserved, "No tokens available for conversation history"
            );
            return format!("{} (insufficient token budget)", NO_HISTORY);
        }

        let selected = self.fitting_prefix(history, reserved);
        if selected.is_empty() {
            return format!(
                "{} (insufficient token budget: most recent entry exceeds {} available tokens)",
                NO_HISTORY, available
            );
        }

        selected
            .iter()
            .enumerate()
            .map(|(position, item)| format!("{} {}", recency_label(position), item.as_ref()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_TOKENS)
    }
}

/// `[MOST RECENT]`, `[2 queries ago]`, `[3 queries ago]`, ...
pub fn recency_label(position: usize) -> String {
    match position {
        0 => "[MOST RECENT]".to_string(),
        n => format!("[{} queries ago]", n + 1),
    }
}
