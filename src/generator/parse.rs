//! Two-tier reading of the generation reply: strict JSON, else keyword fallback

use serde_json::Value;
use tracing::warn;

use super::heuristic::fallback_intent;
use crate::error::AnalystError;
use crate::models::{Intent, IntentOrigin, IntentResult};
use crate::text::truncate_chars;
use crate::Result;

pub const DEFAULT_REASONING: &str = "No reasoning provided";
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Drop markdown fences and any prose around the outermost JSON object.
fn extract_json_object(raw: &str) -> Option<&str> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if cleaned.starts_with('{') && cleaned.ends_with('}') {
        return Some(cleaned);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    (start < end).then(|| &cleaned[start..=end])
}

/// Strict parse. Missing fields take defaults; anything that is not a JSON
/// object is `MalformedModelOutput`.
pub fn parse_intent_reply(raw: &str) -> Result<IntentResult> {
    let body = extract_json_object(raw).ok_or_else(|| {
        AnalystError::MalformedModelOutput(format!(
            "No JSON object in generation reply: {}",
            truncate_chars(raw, 120)
        ))
    })?;

    let json: Value = serde_json::from_str(body).map_err(|e| {
        AnalystError::MalformedModelOutput(format!("Failed to parse generation reply: {}", e))
    })?;

    let object = json.as_object().ok_or_else(|| {
        AnalystError::MalformedModelOutput("Generation reply is not a JSON object".to_string())
    })?;

    let intent = object
        .get("intent")
        .and_then(Value::as_str)
        .map(Intent::from_label)
        .unwrap_or(Intent::General);

    let mut is_modification = object
        .get("is_modification")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut is_data_retrieval = object
        .get("is_data_retrieval")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut sql_query = object
        .get("sql_query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|sql| !sql.is_empty())
        .map(str::to_string);

    if intent == Intent::Modification {
        is_modification = true;
    }
    if is_modification {
        is_data_retrieval = false;
        sql_query = None;
    }

    let reasoning = object
        .get("reasoning")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .unwrap_or(DEFAULT_REASONING)
        .to_string();

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c as f32)
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    Ok(IntentResult {
        intent,
        is_data_retrieval,
        is_modification,
        sql_query,
        reasoning,
        confidence,
        origin: IntentOrigin::Model,
    })
}

/// Never fails: a reply that does not parse falls back to the keyword
/// heuristic over the user's own query text.
pub fn parse_or_fallback(raw: &str, query: &str) -> IntentResult {
    match parse_intent_reply(raw) {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Generation reply unparseable, using keyword fallback");
            fallback_intent(query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_reply() {
        let raw = "```json\n{\"intent\": \"revenue\", \"is_data_retrieval\": true, \"is_modification\": false, \"sql_query\": \"SELECT SUM(ft.value) AS total_revenue FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id WHERE a.type = 1 LIMIT 1;\", \"reasoning\": \"Sum revenue\", \"confidence\": 0.95}\n```";
        let result = parse_intent_reply(raw).unwrap();

        assert_eq!(result.intent, Intent::Revenue);
        assert!(result.is_data_retrieval);
        assert!(result.sql_query.unwrap().contains("a.type = 1"));
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.origin, IntentOrigin::Model);
    }

    #[test]
    fn test_prose_around_object() {
        let raw = "Here is the analysis:\n{\"intent\": \"trend\", \"is_data_retrieval\": true}\nHope this helps.";
        let result = parse_intent_reply(raw).unwrap();
        assert_eq!(result.intent, Intent::Trend);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let result = parse_intent_reply("{}").unwrap();
        assert_eq!(result.intent, Intent::General);
        assert!(!result.is_data_retrieval);
        assert!(!result.is_modification);
        assert_eq!(result.sql_query, None);
        assert_eq!(result.reasoning, DEFAULT_REASONING);
        assert_eq!(result.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_modification_never_carries_sql() {
        let raw = r#"{"intent": "modification", "is_data_retrieval": true, "sql_query": "UPDATE accounts SET type = 0", "confidence": 1.0}"#;
        let result = parse_intent_reply(raw).unwrap();
        assert!(result.is_modification);
        assert!(!result.is_data_retrieval);
        assert_eq!(result.sql_query, None);
    }

    #[test]
    fn test_confidence_clamped_and_blank_sql_dropped() {
        let raw = r#"{"intent": "summary", "is_data_retrieval": true, "sql_query": "   ", "confidence": 7}"#;
        let result = parse_intent_reply(raw).unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.sql_query, None);
    }

    #[test]
    fn test_malformed_reply_falls_back() {
        assert!(matches!(
            parse_intent_reply("I think you want revenue"),
            Err(AnalystError::MalformedModelOutput(_))
        ));

        let result = parse_or_fallback("{not json", "What is total revenue?");
        assert_eq!(result.intent, Intent::Revenue);
        assert!(result.is_data_retrieval);
        assert_eq!(result.sql_query, None);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.origin, IntentOrigin::Heuristic);
    }
}
