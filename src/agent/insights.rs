//! Quick numeric insights attached to every answered query

use serde_json::Value;

use crate::models::Record;
use crate::schema::enums::table_for_column;
use crate::text::format_amount;

pub const MAX_INSIGHTS: usize = 5;

/// Identifier and code columns carry no meaningful total.
fn is_summable(column: &str) -> bool {
    column != "id" && !column.ends_with("_id") && table_for_column(column).is_none()
}

/// `total_revenue` reads as "Total revenue", `amount` as "Total amount".
fn total_label(column: &str) -> String {
    let name = column.strip_prefix("total_").unwrap_or(column);
    format!("Total {}", name.replace('_', " "))
}

/// `Analyzed N data records` followed by column totals, at most five lines.
pub fn extract_insights(rows: &[Record]) -> Vec<String> {
    let Some(first) = rows.first() else {
        return vec!["No data found for this query".to_string()];
    };

    let mut insights = vec![format!("Analyzed {} data records", rows.len())];

    let numeric_columns = first
        .iter()
        .filter(|(column, value)| value.is_number() && is_summable(column))
        .map(|(column, _)| column);

    for column in numeric_columns {
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter_map(Value::as_f64)
            .collect();

        if values.is_empty() {
            continue;
        }

        insights.push(format!(
            "{}: ${}",
            total_label(column),
            format_amount(values.iter().sum())
        ));
    }

    insights.truncate(MAX_INSIGHTS);
    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_rows() {
        assert_eq!(extract_insights(&[]), vec!["No data found for this query"]);
    }

    #[test]
    fn test_totals_skip_codes_and_ids() {
        let rows = vec![
            record(json!({ "account_id": 1, "type": 1, "month": "2022-08", "total_revenue": 2000000.0 })),
            record(json!({ "account_id": 1, "type": 1, "month": "2022-09", "total_revenue": 1369378.43 })),
        ];

        let insights = extract_insights(&rows);
        assert_eq!(
            insights,
            vec![
                "Analyzed 2 data records".to_string(),
                "Total revenue: $3,369,378.43".to_string(),
            ]
        );
    }

    #[test]
    fn test_total_label_without_prefix() {
        let rows = vec![
            record(json!({ "source_id": 1, "net_amount": 400000.0 })),
            record(json!({ "source_id": 2, "net_amount": 727079.0 })),
        ];

        let insights = extract_insights(&rows);
        assert_eq!(insights[1], "Total net amount: $1,127,079.00");
        assert!(insights.iter().all(|line| !line.contains("Total total")));
    }

    #[test]
    fn test_capped_at_five() {
        let rows = vec![record(json!({ "a": 1, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6 }))];
        assert_eq!(extract_insights(&rows).len(), MAX_INSIGHTS);
    }
}
