//! SQLite-backed [`QueryConnection`]

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::info;

use super::QueryConnection;
use crate::error::AnalystError;
use crate::models::{QueryResult, Record};
use crate::Result;

pub struct SqliteConnection {
    pool: SqlitePool,
}

impl SqliteConnection {
    /// Open the financial store read-only.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AnalystError::Config(format!("Invalid DATABASE_URL: {}", e)))?
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                AnalystError::ExecutionFailed(format!("Failed to open financial store: {}", e))
            })?;

        info!(database = %database_url, "Financial store connected (read-only)");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryConnection for SqliteConnection {
    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        let mut stream = sqlx::query(sql).fetch(&self.pool);
        let mut rows = Vec::new();

        while rows.len() < max_rows {
            let next = stream
                .try_next()
                .await
                .map_err(|e| AnalystError::ExecutionFailed(format!("Query execution error: {}", e)))?;

            match next {
                Some(row) => rows.push(row_to_record(&row)?),
                None => break,
            }
        }

        Ok(rows)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Convert by the value's runtime storage class so aggregates over
/// untyped expressions decode too.
fn row_to_record(row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new();

    for column in row.columns() {
        let index = column.ordinal();
        let decode_error =
            |e: sqlx::Error| AnalystError::ExecutionFailed(format!("Failed to decode column {}: {}", column.name(), e));

        let raw = row.try_get_raw(index).map_err(decode_error)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage_class = raw.type_info().name().to_string();
            match storage_class.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index).map_err(decode_error)?),
                "REAL" | "NUMERIC" => {
                    let number = row.try_get_unchecked::<f64, _>(index).map_err(decode_error)?;
                    serde_json::Number::from_f64(number)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index).map_err(decode_error)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(index).map_err(decode_error)?),
            }
        };

        record.insert(column.name().to_string(), value);
    }

    Ok(record)
}


#[cfg(test)]
mod tests {
    use super::fixtures::financial_pool;
    use super::*;
    use crate::execution::SafeQueryExecutor;
    use crate::sql::{sanitize, AggregateFn, AggregateSpec, Column, FilterExpr, FilterOp, GroupedMetricsQuery};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_total_revenue_row() {
        let connection = SqliteConnection::from_pool(financial_pool().await);
        let rows = connection
            .fetch_rows(
                "SELECT SUM(ft.value) AS total_revenue FROM finance_transactions ft \
                 JOIN accounts a ON ft.account_id = a.account_id WHERE a.type = 1",
                10,
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let total = rows[0]["total_revenue"].as_f64().unwrap();
        assert!((total - 3369378.43).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_types_are_plain_values() {
        let connection = SqliteConnection::from_pool(financial_pool().await);
        let rows = connection
            .fetch_rows(
                "SELECT a.name, a.type, a.sub_type, ft.period_start FROM finance_transactions ft \
                 JOIN accounts a ON ft.account_id = a.account_id WHERE a.account_id = 2",
                10,
            )
            .await
            .unwrap();

        let row = &rows[0];
        assert_eq!(row["name"], Value::String("Cost of Sales".to_string()));
        assert_eq!(row["type"], Value::from(2));
        assert_eq!(row["sub_type"], Value::Null);
        assert_eq!(row["period_start"], Value::String("2022-08-01".to_string()));
    }

    #[tokio::test]
    async fn test_max_rows_respected_by_stream() {
        let connection = SqliteConnection::from_pool(financial_pool().await);
        let rows = connection
            .fetch_rows("SELECT * FROM finance_transactions", 2)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_error_after_first_rows_returns_no_rows() {
        // Rows 1 and 2 evaluate cleanly; abs(i64::MIN) overflows on row 3.
        let sql = "SELECT tx_id, CASE WHEN tx_id > 2 THEN abs(-9223372036854775807 - 1) ELSE 1 END AS v \
                   FROM finance_transactions ORDER BY tx_id";

        let connection = SqliteConnection::from_pool(financial_pool().await);
        match connection.fetch_rows(sql, 1000).await {
            Err(AnalystError::ExecutionFailed(message)) => {
                assert!(message.starts_with("Query execution error:"), "{}", message);
                assert!(message.contains("integer overflow"), "{}", message);
            }
            other => panic!("expected execution failure, got {:?}", other),
        }

        let executor = SafeQueryExecutor::new(Arc::new(connection));
        let error = executor.execute(&sanitize(sql)).await.unwrap_err();
        assert!(matches!(error, AnalystError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn test_unknown_column_error() {
        let executor = SafeQueryExecutor::new(Arc::new(SqliteConnection::from_pool(financial_pool().await)));
        let error = executor
            .execute(&sanitize("SELECT revenue_total FROM accounts"))
            .await
            .unwrap_err();

        match error {
            AnalystError::ExecutionFailed(message) => assert!(message.contains("no such column")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_grouped_query_against_store() {
        let executor = SafeQueryExecutor::new(Arc::new(SqliteConnection::from_pool(financial_pool().await)));

        let query = GroupedMetricsQuery::new(
            AggregateSpec::new(AggregateFn::Sum, Column::Value, "total_value").unwrap(),
        )
        .group_by(Column::AccountType)
        .filter(FilterExpr::new(Column::PeriodStart, FilterOp::Gte, "2022-08-01").unwrap())
        .filter(FilterExpr::new(Column::PeriodEnd, FilterOp::Lte, "2022-08-31").unwrap());

        let rows = executor.run_grouped(&query).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["account_type"], Value::from(1));
        assert_eq!(rows[0]["total_value"].as_f64(), Some(2000000.0));
    }
}
