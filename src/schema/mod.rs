//! Financial store schema as seen by the language model
//!
//! Two relations: `accounts` (dimension) and `finance_transactions` (fact),
//! joined on `account_id`.

use serde_json::json;

pub mod enums;

pub use enums::{enum_reference, humanize_code};

pub const ACCOUNTS: &str = "accounts";
pub const TRANSACTIONS: &str = "finance_transactions";

/// Relations a generated query may reference.
pub const KNOWN_RELATIONS: &[&str] = &[TRANSACTIONS, ACCOUNTS];

/// Schema, code tables, join rules and canonical query patterns rendered as
/// pretty JSON for the generation prompt.
pub fn schema_description() -> String {
    let schema = json!({
        "tables": {
            ACCOUNTS: {
                "description": "Master table of all financial accounts",
                "primary_key": "account_id",
                "columns": {
                    "account_id": "INTEGER - primary key",
                    "name": "TEXT - account name (e.g. 'Business Revenue', 'Operating Expenses')",
                    "category_path": "TEXT - hierarchical category path",
                    "sub_category": "TEXT - sub category",
                    "type": "INTEGER - MUST use AccountType enum values",
                    "sub_type": "INTEGER (nullable) - RevenueSubType or ExpenseSubType",
                    "is_summary": "BOOLEAN - summary row flag (0/1)",
                    "is_derived": "BOOLEAN - calculated account flag (0/1)",
                    "description": "TEXT - account description",
                    "is_active": "BOOLEAN - active flag (0/1)",
                }
            },
            TRANSACTIONS: {
                "description": "All financial transactions across time periods",
                "primary_key": "tx_id",
                "foreign_keys": ["account_id -> accounts.account_id"],
                "columns": {
                    "tx_id": "INTEGER - primary key",
                    "account_id": "INTEGER - foreign key to accounts",
                    "period_start": "DATE - YYYY-MM-DD",
                    "period_end": "DATE - YYYY-MM-DD",
                    "value": "DECIMAL(15,2) - amount (positive or negative)",
                    "currency": "INTEGER - MUST use Currency enum",
                    "derived_sub_type": "INTEGER (nullable) - DerivedSubType enum",
                    "posted_date": "TIMESTAMP - posting date",
                    "created_by": "TEXT - creator",
                    "notes": "TEXT - notes",
                    "source_id": "INTEGER - MUST use DataSource enum",
                }
            }
        },
        "enums": enums::enum_definitions(),
        "relationships": [
            "finance_transactions.account_id -> accounts.account_id (INNER JOIN)",
            "finance_transactions.source_id references DataSource enum",
            "accounts.type references AccountType enum",
            "accounts.sub_type references RevenueSubType or ExpenseSubType enum",
            "finance_transactions.derived_sub_type references DerivedSubType enum",
        ],
        "common_patterns": {
            "total_revenue": "SELECT SUM(ft.value) AS total_revenue FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id WHERE a.type = 1 LIMIT 1",
            "total_expenses": "SELECT SUM(ft.value) AS total_expenses FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id WHERE a.type = 3 LIMIT 1",
            "revenue_by_period": "SELECT ft.period_start, ft.period_end, SUM(ft.value) AS total_revenue FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id WHERE a.type = 1 GROUP BY ft.period_start, ft.period_end ORDER BY ft.period_start LIMIT 100",
            "revenue_by_account": "SELECT a.name AS account_name, SUM(ft.value) AS total_value FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id WHERE a.type = 1 GROUP BY a.name ORDER BY total_value DESC LIMIT 100",
            "monthly_revenue": "SELECT strftime('%Y-%m', ft.period_start) AS month, SUM(ft.value) AS monthly_revenue FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id WHERE a.type = 1 GROUP BY month ORDER BY month DESC LIMIT 100",
        },
        "query_rules": [
            "ALWAYS use JOIN between finance_transactions and accounts tables",
            "Use alias 'ft' for finance_transactions and 'a' for accounts",
            "ALWAYS use enum INTEGER values in WHERE clauses, never string names",
            "Date filters: ft.period_start >= 'YYYY-MM-DD' AND ft.period_end <= 'YYYY-MM-DD'",
            "Profit = revenue - cogs - expenses (- tax for net profit), computed from base account types",
            "Always include LIMIT (default 100)",
            "Never use comments, semicolons inside the query, or more than one statement",
        ],
    });

    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_description_mentions_both_relations() {
        let description = schema_description();
        assert!(description.contains(ACCOUNTS));
        assert!(description.contains(TRANSACTIONS));
        assert!(description.contains("AccountType"));

        let parsed: serde_json::Value = serde_json::from_str(&description).unwrap();
        assert!(parsed["tables"]["accounts"].is_object());
    }
}
