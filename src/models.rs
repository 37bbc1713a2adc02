//! Core data models for the query pipeline

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One flat result row: column name → plain JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Ordered rows returned by the executor, never longer than the row cap.
pub type QueryResult = Vec<Record>;

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Revenue,
    Expense,
    Profit,
    Trend,
    Comparison,
    Summary,
    Modification,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Revenue => "revenue",
            Intent::Expense => "expense",
            Intent::Profit => "profit",
            Intent::Trend => "trend",
            Intent::Comparison => "comparison",
            Intent::Summary => "summary",
            Intent::Modification => "modification",
            Intent::General => "general",
        }
    }

    /// Lenient label lookup; anything unrecognised is `General`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "revenue" => Intent::Revenue,
            "expense" | "expenses" => Intent::Expense,
            "profit" => Intent::Profit,
            "trend" => Intent::Trend,
            "comparison" => Intent::Comparison,
            "summary" => Intent::Summary,
            "modification" => Intent::Modification,
            _ => Intent::General,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an [`IntentResult`] came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntentOrigin {
    /// Strictly parsed from the model reply
    #[default]
    Model,
    /// Keyword fallback after the reply failed to parse
    Heuristic,
    /// The model call itself failed
    Unavailable,
}

/// Output of the first model call.
///
/// Invariant: `is_modification == true` implies `sql_query == None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentResult {
    pub intent: Intent,
    pub is_data_retrieval: bool,
    pub is_modification: bool,
    pub sql_query: Option<String>,
    pub reasoning: String,
    pub confidence: f32,
    #[serde(default)]
    pub origin: IntentOrigin,
}

impl IntentResult {
    /// Terminal result used when the generation call could not be made.
    pub fn unavailable(reason: impl fmt::Display) -> Self {
        Self {
            intent: Intent::General,
            is_data_retrieval: false,
            is_modification: false,
            sql_query: None,
            reasoning: format!("Failed to generate query: {}", reason),
            confidence: 0.0,
            origin: IntentOrigin::Unavailable,
        }
    }

    /// SQL worth sending to the validator, if any.
    pub fn usable_sql(&self) -> Option<&str> {
        if self.is_modification || !self.is_data_retrieval {
            return None;
        }
        self.sql_query
            .as_deref()
            .map(str::trim)
            .filter(|sql| !sql.is_empty())
    }
}

//
// ================= Validation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub message: String,
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            message: String::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

//
// ================= Formatting =================
//

/// Parsed output of the second model call. Both fields are non-empty once
/// the formatter hands it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormattedAnswer {
    pub answer_text: String,
    pub context_summary: String,
    /// Raw model reply, absent when the deterministic renderer produced the answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

//
// ================= Caller contract =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            chat_id: None,
            user_id: None,
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub confidence: f32,
    /// At most ten rows of the executed result
    pub data_points: Vec<Record>,
    pub insights: Vec<String>,
    pub timestamp: String,
    pub chat_id: String,
}

impl QueryResponse {
    pub fn new(query: &str, answer: impl Into<String>, confidence: f32, chat_id: &str) -> Self {
        Self {
            query: query.to_string(),
            answer: answer.into(),
            confidence,
            data_points: Vec::new(),
            insights: Vec::new(),
            timestamp: Utc::now().to_rfc3339(),
            chat_id: chat_id.to_string(),
        }
    }
}
