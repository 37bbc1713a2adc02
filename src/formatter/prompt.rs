//! Formatting prompt

use crate::models::{Intent, Record};
use crate::schema::enum_reference;

pub const FORMATTING_SYSTEM: &str =
    "You are a senior financial analyst presenting data insights to stakeholders.";

/// Separates the human answer from the machine-oriented context summary.
pub const SUMMARY_DELIMITER: &str = "---CONTEXT_SUMMARY---";

/// Rows serialised into the prompt
pub const MAX_PROMPT_ROWS: usize = 50;

pub fn results_for_prompt(rows: &[Record]) -> String {
    if rows.is_empty() {
        return "No results found (empty result set)".to_string();
    }

    let shown = &rows[..rows.len().min(MAX_PROMPT_ROWS)];
    let mut rendered = match serde_json::to_string_pretty(shown) {
        Ok(json) => json,
        Err(e) => return format!("Error formatting results: {}", e),
    };

    if rows.len() > MAX_PROMPT_ROWS {
        rendered.push_str(&format!(
            "\n\nNote: Showing first {} of {} total results",
            MAX_PROMPT_ROWS,
            rows.len()
        ));
    }

    rendered
}

pub fn build_formatting_prompt(
    query: &str,
    sql: &str,
    rows: &[Record],
    intent: Intent,
    history: &str,
) -> String {
    format!(
        "CONVERSATION HISTORY (newest first, [MOST RECENT] at the top):\n{history}\n\n\
         When the user refers back (\"above period\", \"that report\"), take the period and data source \
         from [MOST RECENT] first and name them explicitly. Only look further down if they are absent there. \
         If the SQL results contradict the history, trust the results.\n\n\
         USER QUERY: \"{query}\"\n\n\
         SQL QUERY EXECUTED:\n{sql}\n\n\
         QUERY RESULTS (Actual Data):\n{results}\n\n\
         INTENT: {intent}\n\n\
         {enums}\n\n\
         YOUR TASK:\n\
         - Answer the question directly using ONLY the numbers in the results above. Never invent figures.\n\
         - ALWAYS convert enum codes to their names using the mappings above. Say \"Revenue\", not \"1\".\n\
         - Currency as $1,234,567.89, percentages as 25.5%, dates as Month Year.\n\
         - Give 2-3 key insights and keep it to at most 5 short paragraphs.\n\
         - If the results are empty, explain what that means.\n\n\
         After your answer, on a new line, write the delimiter {delimiter} followed by a dense 30-50 word \
         summary for future context: what the user asked (their own terms), data source, time period \
         (Month Year), account types and the main result value.\n\n\
         FORMAT:\n[Your full response]\n\n{delimiter}\n[Your 30-50 word context summary]",
        history = history,
        query = query,
        sql = sql,
        results = results_for_prompt(rows),
        intent = intent,
        enums = enum_reference(),
        delimiter = SUMMARY_DELIMITER,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_capped_with_note() {
        let rows: Vec<Record> = (0..75)
            .map(|i| json!({ "month": i }).as_object().cloned().unwrap())
            .collect();

        let rendered = results_for_prompt(&rows);
        assert!(rendered.contains("\"month\": 49"));
        assert!(!rendered.contains("\"month\": 50"));
        assert!(rendered.ends_with("Note: Showing first 50 of 75 total results"));
    }

    #[test]
    fn test_prompt_carries_enum_reference_and_delimiter() {
        let rows = vec![json!({ "total_revenue": 3369378.43 }).as_object().cloned().unwrap()];
        let prompt = build_formatting_prompt(
            "What is total revenue?",
            "SELECT SUM(ft.value) AS total_revenue FROM finance_transactions ft LIMIT 1;",
            &rows,
            Intent::Revenue,
            "No previous conversation",
        );

        assert!(prompt.contains("1 = Revenue"));
        assert!(prompt.contains(SUMMARY_DELIMITER));
        assert!(prompt.contains("3369378.43"));
        assert!(prompt.contains("INTENT: revenue"));
    }
}
