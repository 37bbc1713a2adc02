//! Keyword fallback for generation replies that fail to parse
//!
//! Deterministic and allocation-light. The first matching group wins, so the
//! order of [`INTENT_KEYWORDS`] is significant.

use crate::models::{Intent, IntentOrigin, IntentResult};

pub const HEURISTIC_CONFIDENCE: f32 = 0.5;

pub const HEURISTIC_REASONING: &str = "Fallback parsing due to LLM response format error";

/// Static keyword lists, checked top to bottom
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::Revenue, &["revenue", "income", "sales"]),
    (Intent::Profit, &["profit", "margin", "profitability"]),
    (Intent::Expense, &["expense", "cost", "spending"]),
    (Intent::Trend, &["trend", "growth", "over time", "pattern"]),
    (Intent::Comparison, &["compare", "comparison", "versus", "vs"]),
];

const MODIFICATION_VERBS: &[&str] = &[
    "update", "delete", "insert", "remove", "drop", "modify", "change", "alter", "truncate", "overwrite",
];

/// Whole-word match on lowercase input. Keeps "vs" from firing inside "canvas".
fn contains_word(text: &str, needle: &str) -> bool {
    if needle.contains(' ') {
        return text.contains(needle);
    }
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| word == needle || word.strip_suffix('s') == Some(needle))
}

pub fn classify_intent(query: &str) -> Intent {
    let lowered = query.to_lowercase();

    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| contains_word(&lowered, kw)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::Summary)
}

/// Imperative write phrasing: a leading write verb, or "set ... to ...".
pub fn looks_like_modification(query: &str) -> bool {
    let lowered = query.trim().to_lowercase();
    let first_word = lowered
        .split(|c: char| !c.is_alphanumeric())
        .find(|word| !word.is_empty())
        .unwrap_or("");

    if MODIFICATION_VERBS.contains(&first_word) {
        return true;
    }

    (first_word == "set" || lowered.contains(" set ")) && lowered.contains(" to ")
}

/// Best-effort result built from the query text alone.
pub fn fallback_intent(query: &str) -> IntentResult {
    if looks_like_modification(query) {
        return IntentResult {
            intent: Intent::Modification,
            is_data_retrieval: false,
            is_modification: true,
            sql_query: None,
            reasoning: HEURISTIC_REASONING.to_string(),
            confidence: HEURISTIC_CONFIDENCE,
            origin: IntentOrigin::Heuristic,
        };
    }

    IntentResult {
        intent: classify_intent(query),
        is_data_retrieval: true,
        is_modification: false,
        sql_query: None,
        reasoning: HEURISTIC_REASONING.to_string(),
        confidence: HEURISTIC_CONFIDENCE,
        origin: IntentOrigin::Heuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_groups_in_order() {
        let cases = vec![
            ("What is total revenue?", Intent::Revenue),
            ("net income for August", Intent::Revenue),
            ("gross margin last quarter", Intent::Profit),
            ("top 10 expense accounts", Intent::Expense),
            ("how did spending evolve over time", Intent::Expense),
            ("show the growth pattern", Intent::Trend),
            ("Q1 vs Q2", Intent::Comparison),
            ("give me an overview", Intent::Summary),
        ];

        for (query, expected) in cases {
            assert_eq!(classify_intent(query), expected, "query: {}", query);
        }
    }

    #[test]
    fn test_revenue_wins_over_later_groups() {
        assert_eq!(classify_intent("compare revenue and costs"), Intent::Revenue);
    }

    #[test]
    fn test_no_substring_false_positives() {
        assert_eq!(classify_intent("canvas of accounts"), Intent::Summary);
    }

    #[test]
    fn test_modification_phrasing() {
        assert!(looks_like_modification("Update all August revenue to 0"));
        assert!(looks_like_modification("delete the tax rows"));
        assert!(looks_like_modification("please set revenue to 100"));
        assert!(!looks_like_modification("What changed in revenue?"));
        assert!(!looks_like_modification("show updated totals"));
    }

    #[test]
    fn test_fallback_result_shape() {
        let result = fallback_intent("What is total revenue?");
        assert_eq!(result.intent, Intent::Revenue);
        assert!(result.is_data_retrieval);
        assert!(result.sql_query.is_none());
        assert_eq!(result.confidence, HEURISTIC_CONFIDENCE);
        assert_eq!(result.origin, IntentOrigin::Heuristic);

        let refused = fallback_intent("Update all August revenue to 0");
        assert!(refused.is_modification);
        assert!(refused.sql_query.is_none());
        assert!(!refused.is_data_retrieval);
    }
}
