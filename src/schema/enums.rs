//! Integer code tables stored in the financial relations
//!
//! The store keeps account types, data sources and currencies as small
//! integers. Prompts carry the code tables so generated SQL filters on the
//! integers, and answers render the labels instead of the raw codes.

use serde_json::{json, Value};

/// A code table: `(code, SQL name, human label)`
pub struct CodeTable {
    pub name: &'static str,
    pub heading: &'static str,
    pub entries: &'static [(i64, &'static str, &'static str)],
}

impl CodeTable {
    pub fn label(&self, code: i64) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(value, _, _)| *value == code)
            .map(|(_, _, label)| *label)
    }
}

pub const ACCOUNT_TYPE: CodeTable = CodeTable {
    name: "AccountType",
    heading: "Account Types",
    entries: &[
        (1, "REVENUE", "Revenue"),
        (2, "COGS", "Cost of Goods Sold"),
        (3, "EXPENSE", "Expense"),
        (4, "TAX", "Tax"),
        (5, "DERIVED", "Derived/Calculated"),
    ],
};

pub const DATA_SOURCE: CodeTable = CodeTable {
    name: "DataSource",
    heading: "Data Sources",
    entries: &[(1, "PL_REPORT", "P&L Report"), (2, "ROOTFI_REPORT", "Rootfi Report")],
};

pub const CURRENCY: CodeTable = CodeTable {
    name: "Currency",
    heading: "Currencies",
    entries: &[
        (1, "USD", "USD (US Dollar)"),
        (2, "EUR", "EUR (Euro)"),
        (3, "GBP", "GBP (British Pound)"),
        (4, "CAD", "CAD (Canadian Dollar)"),
        (5, "AUD", "AUD (Australian Dollar)"),
        (6, "JPY", "JPY (Japanese Yen)"),
        (7, "INR", "INR (Indian Rupee)"),
        (8, "AED", "AED (UAE Dirham)"),
    ],
};

pub const REVENUE_SUB_TYPE: CodeTable = CodeTable {
    name: "RevenueSubType",
    heading: "Revenue Sub-Types",
    entries: &[
        (1, "OPERATING", "Operating Revenue"),
        (2, "NON_OPERATING", "Non-Operating Revenue"),
    ],
};

pub const EXPENSE_SUB_TYPE: CodeTable = CodeTable {
    name: "ExpenseSubType",
    heading: "Expense Sub-Types",
    entries: &[
        (1, "OPERATING", "Operating Expense"),
        (2, "NON_OPERATING", "Non-Operating Expense"),
    ],
};

pub const DERIVED_SUB_TYPE: CodeTable = CodeTable {
    name: "DerivedSubType",
    heading: "Derived Metric Types",
    entries: &[
        (1, "GROSS_PROFIT", "Gross Profit"),
        (2, "OPERATING_PROFIT", "Operating Profit"),
        (3, "EBITDA", "EBITDA"),
        (4, "NON_OPERATING_INCOME", "Non-Operating Income"),
        (5, "PROFIT_BEFORE_TAX", "Profit Before Tax"),
        (6, "NET_PROFIT", "Net Profit"),
        (7, "OTHER", "Other Derived Metric"),
    ],
};

pub const ALL_TABLES: &[&CodeTable] = &[
    &ACCOUNT_TYPE,
    &DATA_SOURCE,
    &CURRENCY,
    &REVENUE_SUB_TYPE,
    &EXPENSE_SUB_TYPE,
    &DERIVED_SUB_TYPE,
];

/// Code table for a result column, when the column name identifies one.
/// `sub_type` is ambiguous without the account type and is left alone.
pub fn table_for_column(column: &str) -> Option<&'static CodeTable> {
    match column.to_lowercase().as_str() {
        "type" | "account_type" | "a.type" => Some(&ACCOUNT_TYPE),
        "source_id" | "data_source" | "source" | "ft.source_id" => Some(&DATA_SOURCE),
        "currency" | "currency_code" | "ft.currency" => Some(&CURRENCY),
        "derived_sub_type" | "ft.derived_sub_type" => Some(&DERIVED_SUB_TYPE),
        _ => None,
    }
}

/// Human label for `value` in `column`, if the column is a known code column.
pub fn humanize_code(column: &str, value: &Value) -> Option<&'static str> {
    let code = value.as_i64()?;
    table_for_column(column)?.label(code)
}

/// Code tables as JSON for the generation prompt.
pub fn enum_definitions() -> Value {
    let mut definitions = serde_json::Map::new();

    for table in ALL_TABLES {
        let values: Vec<Value> = table
            .entries
            .iter()
            .map(|(code, name, label)| json!({ "name": name, "value": code, "description": label }))
            .collect();

        definitions.insert(
            table.name.to_string(),
            json!({
                "values": values,
                "usage": "CRITICAL: Use integer values in WHERE clauses",
            }),
        );
    }

    Value::Object(definitions)
}

/// Code → label reference appended to the formatting prompt.
pub fn enum_reference() -> String {
    let mut reference = String::from("ENUM VALUE MAPPINGS (for human-readable responses):\n\n");

    for table in ALL_TABLES {
        reference.push_str(table.heading);
        reference.push_str(":\n");
        for (code, _, label) in table.entries {
            reference.push_str(&format!("  {} = {}\n", code, label));
        }
        reference.push('\n');
    }

    reference.push_str(
        "IMPORTANT: Always use these human-readable names in your response,\n\
         NOT the integer values. For example, say 'Revenue' not '1',\n\
         and 'USD (US Dollar)' not '1'.",
    );

    reference
}
