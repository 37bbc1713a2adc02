//! Read-only SQL handling: safety gate, normalisation, cost estimate and the
//! typed query builder

pub mod complexity;
pub mod filter;
pub mod sanitizer;
pub mod validator;

pub use complexity::{estimate_complexity, EstimatedCost, QueryComplexity};
pub use filter::{
    AggregateFn, AggregateSpec, Column, FilterExpr, FilterOp, FilterValue, GroupedMetricsQuery,
};
pub use sanitizer::{sanitize, DEFAULT_ROW_LIMIT};
pub use validator::{SafetyRule, SqlValidator, MAX_JOINS, MAX_QUERY_LENGTH, PROHIBITED_KEYWORDS};
