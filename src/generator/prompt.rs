//! Generation prompt
//!
//! The history block arrives already labeled by the token manager, newest
//! entry first.

use crate::schema::schema_description;

pub const GENERATION_SYSTEM: &str = "You are an expert SQL query generator for financial databases.";

const HISTORY_RULES: &str = "\
HOW TO USE THE HISTORY:
1. The list is ordered newest first. The top entry, labeled [MOST RECENT], is the immediately previous query.
2. When the user refers back (\"above period\", \"that report\", \"same data\", \"for that\"):
   -> Start from [MOST RECENT] and take the referenced attribute (period, data source, account type, filters) from it.
   -> Only if it is absent there, check [2 queries ago], then [3 queries ago], and so on.
   -> Never prefer an older entry over a newer one that carries the same attribute.
3. Carry the extracted attributes into the SQL filters (source_id, period_start/period_end, a.type).";

const SQL_RULES: &str = "\
SQL RULES:
- ONLY generate SELECT or WITH queries. Never INSERT, UPDATE, DELETE, DROP, ALTER or any other write.
- ALWAYS join the two tables: FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id
- ALWAYS filter enums by their INTEGER codes: Revenue a.type = 1, COGS a.type = 2, Expense a.type = 3, Tax a.type = 4, Derived a.type = 5
- Date filtering: ft.period_start >= 'YYYY-MM-DD' AND ft.period_end <= 'YYYY-MM-DD'
- Calculate profit from base transactions, not from derived rows (type 5):
  gross_profit = revenue - cogs; operating_profit = revenue - cogs - expenses; net_profit = revenue - cogs - expenses - tax
- Guard every margin against division by zero with CASE WHEN total_revenue > 0
- Use GROUP BY when aggregating by a dimension and ORDER BY for presentation
- ALWAYS add LIMIT (default 100)
- A single statement only. No semicolons inside the query, no SQL comments.";

const INTENT_RULES: &str = "\
INTENTS:
- revenue: income, sales, revenue
- profit: profit, margins, profitability
- expense: costs, expenses, spending
- trend: patterns, growth, changes over time
- comparison: comparing periods, accounts or metrics
- summary: general overview
- modification: the user asks to insert, update, delete or otherwise change data. This is NOT allowed: set is_modification to true and sql_query to null.";

const RESPONSE_FORMAT: &str = r#"RESPONSE FORMAT - return ONLY valid JSON (no markdown, no code blocks):
{
    "intent": "revenue|profit|expense|trend|comparison|summary",
    "is_data_retrieval": true,
    "is_modification": false,
    "sql_query": "SELECT ... FROM ... WHERE ... LIMIT ...",
    "reasoning": "Brief explanation of the query logic",
    "confidence": 0.95
}

For a modification request:
{
    "intent": "modification",
    "is_data_retrieval": false,
    "is_modification": true,
    "sql_query": null,
    "reasoning": "User requested data modification which is not allowed",
    "confidence": 1.0
}"#;

pub fn build_generation_prompt(query: &str, history: &str) -> String {
    format!(
        "DATABASE SCHEMA:\n{schema}\n\n\
         CONVERSATION HISTORY (newest first, [MOST RECENT] at the top):\n{history}\n\n\
         {history_rules}\n\n\
         USER QUERY: \"{query}\"\n\n\
         {intent_rules}\n\n\
         {sql_rules}\n\n\
         {response_format}\n\n\
         Generate the response now:",
        schema = schema_description(),
        history = history,
        history_rules = HISTORY_RULES,
        query = query,
        intent_rules = INTENT_RULES,
        sql_rules = SQL_RULES,
        response_format = RESPONSE_FORMAT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_sections() {
        let history = "[MOST RECENT] Revenue from P&L Report for August 2022\n[2 queries ago] Expenses for Q1 2024";
        let prompt = build_generation_prompt("net profit for the above period", history);

        assert!(prompt.contains("finance_transactions"));
        assert!(prompt.contains("\"net profit for the above period\""));
        assert!(prompt.contains("Start from [MOST RECENT]"));

        let recent = prompt.find("[MOST RECENT] Revenue").unwrap();
        let older = prompt.find("[2 queries ago] Expenses").unwrap();
        assert!(recent < older);
    }
}
