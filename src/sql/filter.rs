//! Typed filter and aggregate specifications
//!
//! Built programmatically instead of by the model. Every value is checked when
//! the expression is constructed, and the rendered SQL still goes through the
//! safety gate before execution.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnalystError;
use crate::Result;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap();
}

/// Columns of the two financial relations, qualified by their usual aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    AccountId,
    PeriodStart,
    PeriodEnd,
    Value,
    Currency,
    DerivedSubType,
    SourceId,
    PostedDate,
    AccountName,
    AccountType,
    AccountSubType,
    CategoryPath,
    SubCategory,
    IsSummary,
    IsDerived,
    IsActive,
}

impl Column {
    pub fn qualified(&self) -> &'static str {
        match self {
            Column::AccountId => "ft.account_id",
            Column::PeriodStart => "ft.period_start",
            Column::PeriodEnd => "ft.period_end",
            Column::Value => "ft.value",
            Column::Currency => "ft.currency",
            Column::DerivedSubType => "ft.derived_sub_type",
            Column::SourceId => "ft.source_id",
            Column::PostedDate => "ft.posted_date",
            Column::AccountName => "a.name",
            Column::AccountType => "a.type",
            Column::AccountSubType => "a.sub_type",
            Column::CategoryPath => "a.category_path",
            Column::SubCategory => "a.sub_category",
            Column::IsSummary => "a.is_summary",
            Column::IsDerived => "a.is_derived",
            Column::IsActive => "a.is_active",
        }
    }

    /// Name of the column in a grouped result row.
    pub fn output_name(&self) -> &'static str {
        match self {
            Column::AccountName => "account_name",
            Column::AccountType => "account_type",
            Column::AccountSubType => "account_sub_type",
            other => other
                .qualified()
                .split_once('.')
                .map(|(_, name)| name)
                .unwrap_or_else(|| other.qualified()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Value)
    }

    pub fn is_code(&self) -> bool {
        matches!(
            self,
            Column::AccountId
                | Column::Currency
                | Column::DerivedSubType
                | Column::SourceId
                | Column::AccountType
                | Column::AccountSubType
                | Column::IsSummary
                | Column::IsDerived
                | Column::IsActive
        )
    }

    pub fn is_textual(&self) -> bool {
        !self.is_numeric() && !self.is_code()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualified())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    Between,
}

impl FilterOp {
    fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "LIKE",
            FilterOp::In => "IN",
            FilterOp::Between => "BETWEEN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Integer(i64),
    Real(f64),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    fn is_scalar(&self) -> bool {
        !matches!(self, FilterValue::List(_))
    }

    fn check(&self) -> Result<()> {
        match self {
            FilterValue::Integer(_) => Ok(()),
            FilterValue::Real(v) if v.is_finite() => Ok(()),
            FilterValue::Real(v) => Err(AnalystError::InvalidFilter(format!(
                "non-finite number {}",
                v
            ))),
            FilterValue::Text(text) => {
                if text.contains('\0')
                    || ["--", "/*", "*/", ";"].iter().any(|t| text.contains(t))
                {
                    Err(AnalystError::InvalidFilter(format!(
                        "text value contains a forbidden token: {:?}",
                        text
                    )))
                } else {
                    Ok(())
                }
            }
            FilterValue::List(items) => items.iter().try_for_each(|item| {
                if item.is_scalar() {
                    item.check()
                } else {
                    Err(AnalystError::InvalidFilter("nested lists are not allowed".to_string()))
                }
            }),
        }
    }

    fn render(&self) -> String {
        match self {
            FilterValue::Integer(v) => v.to_string(),
            FilterValue::Real(v) => v.to_string(),
            FilterValue::Text(text) => format!("'{}'", text.replace('\'', "''")),
            FilterValue::List(items) => items
                .iter()
                .map(FilterValue::render)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(value as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Real(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

/// `column op value`, valid by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterExpr {
    column: Column,
    op: FilterOp,
    value: FilterValue,
}

impl FilterExpr {
    pub fn new(column: Column, op: FilterOp, value: impl Into<FilterValue>) -> Result<Self> {
        let value = value.into();
        value.check()?;

        match (op, &value) {
            (FilterOp::In, FilterValue::List(items)) if !items.is_empty() => {}
            (FilterOp::In, _) => {
                return Err(AnalystError::InvalidFilter(
                    "IN needs a non-empty list".to_string(),
                ))
            }
            (FilterOp::Between, FilterValue::List(items)) if items.len() == 2 => {}
            (FilterOp::Between, _) => {
                return Err(AnalystError::InvalidFilter(
                    "BETWEEN needs exactly two values".to_string(),
                ))
            }
            (FilterOp::Like, FilterValue::Text(_)) if column.is_textual() => {}
            (FilterOp::Like, _) => {
                return Err(AnalystError::InvalidFilter(format!(
                    "LIKE needs a text pattern on a text column, got {}",
                    column
                )))
            }
            (_, FilterValue::List(_)) => {
                return Err(AnalystError::InvalidFilter(format!(
                    "{:?} needs a single value",
                    op
                )))
            }
            _ => {}
        }

        Ok(Self { column, op, value })
    }

    pub fn column(&self) -> Column {
        self.column
    }

    pub fn render(&self) -> String {
        match (&self.op, &self.value) {
            (FilterOp::In, value) => format!("{} IN ({})", self.column, value.render()),
            (FilterOp::Between, FilterValue::List(items)) => format!(
                "{} BETWEEN {} AND {}",
                self.column,
                items[0].render(),
                items[1].render()
            ),
            (op, value) => format!("{} {} {}", self.column, op.sql(), value.render()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggregateFn {
    fn sql(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Count => "COUNT",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSpec {
    function: AggregateFn,
    column: Column,
    alias: String,
}

impl AggregateSpec {
    pub fn new(function: AggregateFn, column: Column, alias: impl Into<String>) -> Result<Self> {
        let alias = alias.into();

        if !IDENTIFIER.is_match(&alias) {
            return Err(AnalystError::InvalidFilter(format!(
                "alias {:?} is not a plain identifier",
                alias
            )));
        }

        if matches!(function, AggregateFn::Sum | AggregateFn::Avg) && !column.is_numeric() {
            return Err(AnalystError::InvalidFilter(format!(
                "{} is not numeric and cannot be used with {}",
                column,
                function.sql()
            )));
        }

        Ok(Self {
            function,
            column,
            alias,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn render(&self) -> String {
        format!("{}({}) AS {}", self.function.sql(), self.column, self.alias)
    }
}

/// Grouped aggregate over the joined financial relations.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedMetricsQuery {
    aggregates: Vec<AggregateSpec>,
    group_by: Vec<Column>,
    filters: Vec<FilterExpr>,
    order_desc: Option<String>,
    limit: usize,
}

impl GroupedMetricsQuery {
    pub fn new(aggregate: AggregateSpec) -> Self {
        Self {
            aggregates: vec![aggregate],
            group_by: Vec::new(),
            filters: Vec::new(),
            order_desc: None,
            limit: 100,
        }
    }

    pub fn aggregate(mut self, aggregate: AggregateSpec) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn group_by(mut self, column: Column) -> Self {
        if !self.group_by.contains(&column) {
            self.group_by.push(column);
        }
        self
    }

    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filters.push(filter);
        self
    }

    /// Order by one of the aggregate aliases, largest first.
    pub fn order_by_desc(mut self, alias: &str) -> Result<Self> {
        if !self.aggregates.iter().any(|a| a.alias() == alias) {
            return Err(AnalystError::InvalidFilter(format!(
                "unknown aggregate alias {:?}",
                alias
            )));
        }
        self.order_desc = Some(alias.to_string());
        Ok(self)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn render(&self) -> String {
        let mut select: Vec<String> = self
            .group_by
            .iter()
            .map(|column| format!("{} AS {}", column, column.output_name()))
            .collect();
        select.extend(self.aggregates.iter().map(AggregateSpec::render));

        let mut sql = format!(
            "SELECT {} FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id",
            select.join(", ")
        );

        if !self.filters.is_empty() {
            let conditions: Vec<String> = self.filters.iter().map(FilterExpr::render).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.group_by.is_empty() {
            let columns: Vec<&str> = self.group_by.iter().map(Column::qualified).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&columns.join(", "));
        }

        if let Some(alias) = &self.order_desc {
            sql.push_str(&format!(" ORDER BY {} DESC", alias));
        } else if !self.group_by.is_empty() {
            let columns: Vec<&str> = self.group_by.iter().map(Column::qualified).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&columns.join(", "));
        }

        sql.push_str(&format!(" LIMIT {}", self.limit));
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlValidator;

    #[test]
    fn test_filter_rendering() {
        let f = FilterExpr::new(Column::AccountType, FilterOp::Eq, 1).unwrap();
        assert_eq!(f.render(), "a.type = 1");

        let f = FilterExpr::new(
            Column::PeriodStart,
            FilterOp::Between,
            FilterValue::List(vec!["2022-08-01".into(), "2022-08-31".into()]),
        )
        .unwrap();
        assert_eq!(f.render(), "ft.period_start BETWEEN '2022-08-01' AND '2022-08-31'");

        let f = FilterExpr::new(Column::AccountName, FilterOp::Like, "O'Brien%").unwrap();
        assert_eq!(f.render(), "a.name LIKE 'O''Brien%'");

        let f = FilterExpr::new(
            Column::SourceId,
            FilterOp::In,
            FilterValue::List(vec![1.into(), 2.into()]),
        )
        .unwrap();
        assert_eq!(f.render(), "ft.source_id IN (1, 2)");
    }

    #[test]
    fn test_filter_rejected_at_construction() {
        assert!(FilterExpr::new(Column::AccountName, FilterOp::Eq, "x'; DROP TABLE accounts").is_err());
        assert!(FilterExpr::new(Column::AccountName, FilterOp::Eq, "a -- b").is_err());
        assert!(FilterExpr::new(Column::Value, FilterOp::Like, "1%").is_err());
        assert!(FilterExpr::new(Column::Value, FilterOp::Gt, f64::NAN).is_err());
        assert!(FilterExpr::new(Column::SourceId, FilterOp::In, FilterValue::List(vec![])).is_err());
        assert!(FilterExpr::new(Column::SourceId, FilterOp::Between, 1).is_err());
        assert!(FilterExpr::new(
            Column::SourceId,
            FilterOp::Eq,
            FilterValue::List(vec![1.into()])
        )
        .is_err());
    }

    #[test]
    fn test_aggregate_validation() {
        assert!(AggregateSpec::new(AggregateFn::Sum, Column::Value, "total").is_ok());
        assert!(AggregateSpec::new(AggregateFn::Count, Column::AccountId, "n").is_ok());
        assert!(AggregateSpec::new(AggregateFn::Sum, Column::AccountName, "total").is_err());
        assert!(AggregateSpec::new(AggregateFn::Sum, Column::Value, "total; DROP").is_err());
        assert!(AggregateSpec::new(AggregateFn::Sum, Column::Value, "").is_err());
    }

    #[test]
    fn test_grouped_query_passes_safety_gate() {
        let total = AggregateSpec::new(AggregateFn::Sum, Column::Value, "total_value").unwrap();
        let query = GroupedMetricsQuery::new(total)
            .group_by(Column::AccountName)
            .filter(FilterExpr::new(Column::AccountType, FilterOp::Eq, 1).unwrap())
            .order_by_desc("total_value")
            .unwrap()
            .limit(10);

        let sql = query.render();
        assert_eq!(
            sql,
            "SELECT a.name AS account_name, SUM(ft.value) AS total_value \
             FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id \
             WHERE a.type = 1 GROUP BY a.name ORDER BY total_value DESC LIMIT 10"
        );
        assert!(SqlValidator::default().validate(&sql).valid);
    }

    #[test]
    fn test_order_by_unknown_alias() {
        let total = AggregateSpec::new(AggregateFn::Sum, Column::Value, "total").unwrap();
        assert!(GroupedMetricsQuery::new(total).order_by_desc("other").is_err());
    }
}
