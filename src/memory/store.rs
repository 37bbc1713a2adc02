//! Session and turn records
//!
//! Turns are append-only. Only an explicit clear removes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Intent, Record};

/// Result rows kept on a stored turn
pub const MAX_STORED_DATA_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    #[default]
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    pub fn from_db(role: &str) -> Self {
        match role.to_lowercase().as_str() {
            "assistant" => TurnRole::Assistant,
            _ => TurnRole::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOrder {
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub chat_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Rolling one-line summary of the latest turn
    pub context_summary: String,
}

impl Session {
    pub fn new(chat_id: impl Into<String>, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            chat_id: chat_id.into(),
            user_id,
            created_at: now,
            last_activity: now,
            context_summary: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub id: i64,
    pub chat_id: String,
    pub role: TurnRole,
    pub content: String,
    pub intent: Option<String>,
    pub data_points: Vec<Record>,
    pub prompt: Option<String>,
    pub raw_model_response: Option<String>,
    /// Only set on assistant turns
    pub summary: Option<String>,
    pub token_estimate: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

/// A turn before it is stored. The store assigns `id` and `timestamp`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTurn {
    pub role: TurnRole,
    pub content: String,
    pub intent: Option<String>,
    pub data_points: Vec<Record>,
    pub prompt: Option<String>,
    pub raw_model_response: Option<String>,
    pub summary: Option<String>,
    pub token_estimate: Option<usize>,
}

impl NewTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent.as_str().to_string());
        self
    }

    /// Keeps at most [`MAX_STORED_DATA_POINTS`] rows.
    pub fn with_data_points(mut self, rows: &[Record]) -> Self {
        self.data_points = rows.iter().take(MAX_STORED_DATA_POINTS).cloned().collect();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_model_response = Some(raw.into());
        self
    }

    /// Ignored on user turns.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        if self.role == TurnRole::Assistant {
            self.summary = Some(summary.into());
        }
        self
    }

    pub fn with_token_estimate(mut self, tokens: usize) -> Self {
        self.token_estimate = Some(tokens);
        self
    }

    pub(crate) fn into_turn(self, id: i64, chat_id: &str, timestamp: DateTime<Utc>) -> Turn {
        Turn {
            id,
            chat_id: chat_id.to_string(),
            role: self.role,
            content: self.content,
            intent: self.intent,
            data_points: self.data_points,
            prompt: self.prompt,
            raw_model_response: self.raw_model_response,
            summary: self.summary,
            token_estimate: self.token_estimate,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatStatistics {
    pub chat_id: String,
    pub message_count: usize,
    pub total_tokens: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_points_capped() {
        let rows: Vec<Record> = (0..8)
            .map(|i| json!({ "n": i }).as_object().cloned().unwrap())
            .collect();
        let turn = NewTurn::assistant("answer").with_data_points(&rows);
        assert_eq!(turn.data_points.len(), MAX_STORED_DATA_POINTS);
        assert_eq!(turn.data_points[0]["n"], json!(0));
    }

    #[test]
    fn test_summary_only_on_assistant_turns() {
        assert_eq!(NewTurn::user("q").with_summary("s").summary, None);
        assert_eq!(
            NewTurn::assistant("a").with_summary("s").summary.as_deref(),
            Some("s")
        );
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(TurnRole::from_db(TurnRole::Assistant.as_str()), TurnRole::Assistant);
        assert_eq!(TurnRole::from_db("USER"), TurnRole::User);
    }
}
