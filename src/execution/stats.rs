//! Result introspection for diagnostics. Not used on the answer path.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::Record;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub avg: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultSummary {
    pub row_count: usize,
    pub has_data: bool,
    pub columns: Vec<String>,
    pub column_count: usize,
    pub column_types: BTreeMap<String, &'static str>,
    pub numeric_stats: BTreeMap<String, NumericStats>,
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "real",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn summarize_results(rows: &[Record]) -> ResultSummary {
    let Some(first) = rows.first() else {
        return ResultSummary {
            row_count: 0,
            has_data: false,
            columns: Vec::new(),
            column_count: 0,
            column_types: BTreeMap::new(),
            numeric_stats: BTreeMap::new(),
        };
    };

    let columns: Vec<String> = first.keys().cloned().collect();
    let mut column_types = BTreeMap::new();
    let mut numeric_stats = BTreeMap::new();

    for column in &columns {
        // First non-null value decides the type.
        let inferred = rows
            .iter()
            .filter_map(|row| row.get(column))
            .find(|value| !value.is_null())
            .map(value_type)
            .unwrap_or("null");
        column_types.insert(column.clone(), inferred);

        let numbers: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter_map(Value::as_f64)
            .collect();

        if !numbers.is_empty() {
            let sum: f64 = numbers.iter().sum();
            numeric_stats.insert(
                column.clone(),
                NumericStats {
                    min: numbers.iter().cloned().fold(f64::INFINITY, f64::min),
                    max: numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                    sum,
                    avg: sum / numbers.len() as f64,
                    count: numbers.len(),
                },
            );
        }
    }

    ResultSummary {
        row_count: rows.len(),
        has_data: true,
        column_count: columns.len(),
        columns,
        column_types,
        numeric_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_results() {
        let summary = summarize_results(&[]);
        assert!(!summary.has_data);
        assert_eq!(summary.row_count, 0);
        assert!(summary.numeric_stats.is_empty());
    }

    #[test]
    fn test_numeric_stats_and_types() {
        let rows = vec![
            record(json!({"month": "2022-08", "revenue": 100.0, "note": null})),
            record(json!({"month": "2022-09", "revenue": 300.0, "note": "late"})),
            record(json!({"month": "2022-10", "revenue": null, "note": null})),
        ];

        let summary = summarize_results(&rows);
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.column_count, 3);
        assert_eq!(summary.column_types["month"], "text");
        assert_eq!(summary.column_types["revenue"], "real");
        assert_eq!(summary.column_types["note"], "text");

        let revenue = &summary.numeric_stats["revenue"];
        assert_eq!(revenue.count, 2);
        assert_eq!(revenue.min, 100.0);
        assert_eq!(revenue.max, 300.0);
        assert_eq!(revenue.sum, 400.0);
        assert_eq!(revenue.avg, 200.0);
        assert!(!summary.numeric_stats.contains_key("month"));
    }
}
