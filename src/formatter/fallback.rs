//! Deterministic rendering used when the formatting call or its reply fails

use serde_json::Value;

use super::prompt::SUMMARY_DELIMITER;
use crate::models::{FormattedAnswer, Intent, Record};
use crate::schema::humanize_code;
use crate::text::{format_amount, humanize_key, truncate_chars};

/// Summaries shorter than this are replaced with a synthesized one.
pub const MIN_SUMMARY_CHARS: usize = 20;

/// Rows listed by the multi-row renderer
const LISTED_ROWS: usize = 5;

pub fn fallback_summary(query: &str, intent: Intent) -> String {
    format!(
        "User asked: \"{}...\" | Intent: {}",
        truncate_chars(query, 60),
        intent
    )
}

/// Split a formatting reply on the delimiter. Never fails. The answer text is
/// empty when the reply opens with the delimiter; callers fill it from rows.
pub fn parse_formatted(raw: &str, query: &str, intent: Intent) -> FormattedAnswer {
    let raw = raw.trim();

    let (answer, summary) = match raw.split_once(SUMMARY_DELIMITER) {
        Some((answer, summary)) => (answer.trim(), summary.trim()),
        None => {
            tracing::warn!("Context summary delimiter missing from formatting reply");
            (raw, "")
        }
    };

    let context_summary = if summary.chars().count() < MIN_SUMMARY_CHARS {
        fallback_summary(query, intent)
    } else {
        summary.to_string()
    };

    FormattedAnswer {
        answer_text: answer.to_string(),
        context_summary,
        raw_response: Some(raw.to_string()),
    }
}

fn is_identifier_column(column: &str) -> bool {
    column == "id" || column.ends_with("_id")
}

/// One cell as display text. Code columns become labels, amounts get grouping.
fn render_value(column: &str, value: &Value, currency: bool) -> String {
    if let Some(label) = humanize_code(column, value) {
        return label.to_string();
    }

    match value {
        Value::Null => "N/A".to_string(),
        Value::String(text) => text.clone(),
        Value::Number(n) if is_identifier_column(column) => n.to_string(),
        Value::Number(n) => {
            let amount = format_amount(n.as_f64().unwrap_or_default());
            if currency {
                format!("${}", amount)
            } else {
                amount
            }
        }
        other => other.to_string(),
    }
}

/// Single row → `**Field**: value` lines; several rows → numbered first five.
pub fn render_rows(rows: &[Record], intent: Intent) -> String {
    if rows.is_empty() {
        return no_data_message(intent);
    }

    let mut parts = vec![
        format!(
            "Based on the available financial data, here are the results for your query about {}:",
            intent
        ),
        String::new(),
    ];

    if let [row] = rows {
        for (column, value) in row {
            parts.push(format!(
                "**{}**: {}",
                humanize_key(column),
                render_value(column, value, true)
            ));
        }
    } else {
        parts.push(format!("Found {} records:", rows.len()));
        parts.push(String::new());

        for (i, row) in rows.iter().take(LISTED_ROWS).enumerate() {
            let fields = row
                .iter()
                .map(|(column, value)| format!("{}: {}", column, render_value(column, value, false)))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("{}. {}", i + 1, fields));
        }

        if rows.len() > LISTED_ROWS {
            parts.push(format!("... and {} more results", rows.len() - LISTED_ROWS));
        }
    }

    parts.push(String::new());
    parts.push(
        "For more detailed analysis or to explore specific aspects of this data, please let me know!"
            .to_string(),
    );

    parts.join("\n")
}

pub fn no_data_message(intent: Intent) -> String {
    format!(
        "I couldn't find any data matching your query about {}. The database query returned no results. \
         Please try rephrasing your question or specifying a different time period.",
        intent
    )
}

/// Guidance for a failed execution, keyed on well-known error text.
pub fn error_response(error_message: &str, query: &str) -> String {
    let mut response = format!(
        "I encountered an issue while processing your question: \"{}\"\n\n",
        query
    );
    let lowered = error_message.to_lowercase();

    if lowered.contains("timeout") {
        response.push_str(
            "The query took too long to execute. Please try:\n\
             - Narrowing down the time period\n\
             - Focusing on specific accounts or categories\n\
             - Breaking down your question into smaller parts",
        );
    } else if lowered.contains("no such column") {
        response.push_str(
            "The query referenced a column that doesn't exist in the database. Please rephrase your \
             question using standard financial terms like 'revenue', 'expenses', 'profit', or 'account'.",
        );
    } else if lowered.contains("syntax error") {
        response.push_str(
            "There was a problem generating the database query. Please try rephrasing your question in simpler terms.",
        );
    } else {
        response.push_str(&format!("Technical details: {}\n\n", error_message));
        response.push_str(
            "Please try rephrasing your question or ask about a different aspect of the financial data.",
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_summary_after_delimiter() {
        let raw = "Your total revenue is $3,369,378.43.\n\n---CONTEXT_SUMMARY---\n  User asked about total revenue across all sources. Found $3,369,378.43 for Aug-Sep 2022.  ";
        let parsed = parse_formatted(raw, "What is total revenue?", Intent::Revenue);

        assert_eq!(parsed.answer_text, "Your total revenue is $3,369,378.43.");
        assert_eq!(
            parsed.context_summary,
            "User asked about total revenue across all sources. Found $3,369,378.43 for Aug-Sep 2022."
        );
    }

    #[test]
    fn test_missing_or_short_summary_synthesized() {
        let parsed = parse_formatted("Revenue is up.", "What is total revenue?", Intent::Revenue);
        assert_eq!(parsed.answer_text, "Revenue is up.");
        assert_eq!(
            parsed.context_summary,
            "User asked: \"What is total revenue?...\" | Intent: revenue"
        );

        let short = parse_formatted("Answer\n---CONTEXT_SUMMARY---\ntoo short", "q", Intent::Profit);
        assert_eq!(short.answer_text, "Answer");
        assert!(short.context_summary.starts_with("User asked:"));
    }

    #[test]
    fn test_leading_delimiter_leaves_answer_empty() {
        let raw = "---CONTEXT_SUMMARY---\nUser asked about total revenue. Found $3,369,378.43 for Aug-Sep 2022.";
        let parsed = parse_formatted(raw, "What is total revenue?", Intent::Revenue);

        assert!(parsed.answer_text.is_empty());
        assert!(parsed.context_summary.starts_with("User asked about total revenue."));
    }

    #[test]
    fn test_single_row_rendering() {
        let rows = vec![record(json!({ "total_revenue": 3369378.43 }))];
        let rendered = render_rows(&rows, Intent::Revenue);
        assert!(rendered.contains("**Total Revenue**: $3,369,378.43"));
    }

    #[test]
    fn test_codes_rendered_as_labels() {
        let rows = vec![record(json!({ "type": 1, "source_id": 2, "total": 10.0 }))];
        let rendered = render_rows(&rows, Intent::Summary);
        assert!(rendered.contains("**Type**: Revenue"));
        assert!(rendered.contains("Rootfi"));
        assert!(!rendered.contains("**Type**: $"));
    }

    #[test]
    fn test_multi_row_rendering() {
        let rows: Vec<Record> = (1..=8)
            .map(|i| record(json!({ "account_id": i, "total": i as f64 * 1000.0 })))
            .collect();
        let rendered = render_rows(&rows, Intent::Expense);

        assert!(rendered.contains("Found 8 records:"));
        assert!(rendered.contains("1. account_id: 1, total: 1,000.00"));
        assert!(rendered.contains("5. account_id: 5"));
        assert!(!rendered.contains("6. account_id"));
        assert!(rendered.contains("... and 3 more results"));
    }

    #[test]
    fn test_empty_rows() {
        assert!(render_rows(&[], Intent::Trend).contains("returned no results"));
    }

    #[test]
    fn test_error_guidance() {
        let q = "What is total revenue?";
        assert!(error_response("Query execution timeout after 30s", q).contains("Narrowing down"));
        assert!(error_response("no such column: ft.amount", q).contains("standard financial terms"));
        assert!(error_response("near \"FROM\": syntax error", q).contains("simpler terms"));

        let generic = error_response("disk I/O error", q);
        assert!(generic.contains("Technical details: disk I/O error"));
        assert!(generic.contains(q));
    }
}
