//! Safe execution of validated, sanitized read-only queries
//!
//! The executor never sees the storage engine directly. It talks to a
//! [`QueryConnection`] and enforces the timeout and row cap itself.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::AnalystError;
use crate::models::QueryResult;
use crate::sql::{estimate_complexity, sanitize, GroupedMetricsQuery, SqlValidator};
use crate::text::truncate_chars;
use crate::Result;

pub mod sqlite;
pub mod stats;

pub use sqlite::SqliteConnection;
pub use stats::{summarize_results, NumericStats, ResultSummary};

/// Hard cap on materialised rows, regardless of any LIMIT in the query
pub const MAX_RESULT_ROWS: usize = 1000;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability to run one read-only statement against the financial store.
#[async_trait]
pub trait QueryConnection: Send + Sync {
    /// Run `sql` and return at most `max_rows` rows as flat records.
    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<QueryResult>;

    fn name(&self) -> &str;
}

pub struct SafeQueryExecutor {
    connection: Arc<dyn QueryConnection>,
    validator: SqlValidator,
    timeout: Duration,
    max_rows: usize,
}

impl SafeQueryExecutor {
    pub fn new(connection: Arc<dyn QueryConnection>) -> Self {
        Self {
            connection,
            validator: SqlValidator::default(),
            timeout: DEFAULT_QUERY_TIMEOUT,
            max_rows: MAX_RESULT_ROWS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lower the row cap. It can never be raised above [`MAX_RESULT_ROWS`].
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.clamp(1, MAX_RESULT_ROWS);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.execute_with_timeout(sql, self.timeout).await
    }

    /// Execute with a per-call timeout. On any failure no rows are returned.
    pub async fn execute_with_timeout(&self, sql: &str, timeout: Duration) -> Result<QueryResult> {
        let started = Instant::now();
        let complexity = estimate_complexity(sql);

        debug!(
            connection = self.connection.name(),
            sql = %truncate_chars(sql, 200),
            cost = ?complexity.estimated_cost,
            "Executing SQL query"
        );

        let outcome = tokio::time::timeout(timeout, self.connection.fetch_rows(sql, self.max_rows)).await;

        match outcome {
            Ok(Ok(mut rows)) => {
                rows.truncate(self.max_rows);
                info!(
                    row_count = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Query executed"
                );
                Ok(rows)
            }
            Ok(Err(e)) => {
                let message = match e {
                    AnalystError::ExecutionFailed(message) => message,
                    other => other.to_string(),
                };
                error!(error = %message, "Query execution failed");
                Err(AnalystError::ExecutionFailed(message))
            }
            Err(_) => {
                let message = format!(
                    "Query execution timeout after {}s",
                    timeout.as_secs_f64()
                );
                error!(error = %message, "Query execution failed");
                Err(AnalystError::ExecutionFailed(message))
            }
        }
    }

    /// Render a typed grouped query and run it through the same gate,
    /// normalisation and execution path as model-generated SQL.
    pub async fn run_grouped(&self, query: &GroupedMetricsQuery) -> Result<QueryResult> {
        let sql = query.render();
        self.validator.ensure_valid(&sql)?;
        self.execute(&sanitize(&sql)).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-process connection returning a fixed number of generated rows.
    pub struct FixedRows {
        pub rows: usize,
        pub delay: Option<Duration>,
        pub fail_with: Option<String>,
        pub calls: AtomicUsize,
        pub last_sql: std::sync::Mutex<Option<String>>,
    }

    impl FixedRows {
        pub fn new(rows: usize) -> Self {
            Self {
                rows,
                delay: None,
                fail_with: None,
                calls: AtomicUsize::new(0),
                last_sql: std::sync::Mutex::new(None),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryConnection for FixedRows {
        async fn fetch_rows(&self, sql: &str, _max_rows: usize) -> Result<QueryResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_sql.lock().unwrap() = Some(sql.to_string());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(message) = &self.fail_with {
                return Err(AnalystError::ExecutionFailed(message.clone()));
            }

            // Ignores the cap on purpose so the executor's own truncation is exercised.
            Ok((0..self.rows)
                .map(|i| {
                    let mut record = crate::models::Record::new();
                    record.insert("n".to_string(), json!(i));
                    record
                })
                .collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedRows;
    use super::*;
    use crate::sql::{AggregateFn, AggregateSpec, Column};

    #[tokio::test]
    async fn test_row_cap_enforced() {
        let connection = Arc::new(FixedRows::new(MAX_RESULT_ROWS + 250));
        let executor = SafeQueryExecutor::new(connection.clone());

        let rows = executor.execute("SELECT * FROM accounts;").await.unwrap();
        assert_eq!(rows.len(), MAX_RESULT_ROWS);
        assert_eq!(connection.calls(), 1);
    }

    #[tokio::test]
    async fn test_row_cap_cannot_be_raised() {
        let connection = Arc::new(FixedRows::new(MAX_RESULT_ROWS + 5));
        let executor = SafeQueryExecutor::new(connection).with_max_rows(5000);
        let rows = executor.execute("SELECT * FROM accounts;").await.unwrap();
        assert_eq!(rows.len(), MAX_RESULT_ROWS);
    }

    #[tokio::test]
    async fn test_timeout_is_normalized() {
        let mut connection = FixedRows::new(3);
        connection.delay = Some(Duration::from_millis(200));
        let executor = SafeQueryExecutor::new(Arc::new(connection));

        let error = executor
            .execute_with_timeout("SELECT * FROM accounts;", Duration::from_millis(20))
            .await
            .unwrap_err();

        match error {
            AnalystError::ExecutionFailed(message) => assert!(message.contains("timeout")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_error_keeps_original_message() {
        let mut connection = FixedRows::new(3);
        connection.fail_with = Some("no such column: revenue_total".to_string());
        let executor = SafeQueryExecutor::new(Arc::new(connection));

        let error = executor.execute("SELECT revenue_total FROM accounts;").await.unwrap_err();
        assert!(matches!(error, AnalystError::ExecutionFailed(ref m) if m.contains("no such column")));
    }

    #[tokio::test]
    async fn test_run_grouped_is_sanitized() {
        let connection = Arc::new(FixedRows::new(2));
        let executor = SafeQueryExecutor::new(connection.clone());

        let query = GroupedMetricsQuery::new(
            AggregateSpec::new(AggregateFn::Sum, Column::Value, "total_value").unwrap(),
        )
        .group_by(Column::SourceId);

        let rows = executor.run_grouped(&query).await.unwrap();
        assert_eq!(rows.len(), 2);

        let sql = connection.last_sql.lock().unwrap().clone().unwrap();
        assert!(sql.ends_with("LIMIT 100;"));
        assert!(sql.contains("GROUP BY ft.source_id"));
    }
}
