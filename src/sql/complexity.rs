//! Rough cost estimate for a candidate query, used for diagnostics logging

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::validator::{has_limit, join_count};

lazy_static! {
    static ref GROUP_BY: Regex = Regex::new(r"(?i)\bgroup\s+by\b").unwrap();
    static ref ORDER_BY: Regex = Regex::new(r"(?i)\border\s+by\b").unwrap();
    static ref AGGREGATE: Regex = Regex::new(r"(?i)\b(sum|avg|count|max|min)\s*\(").unwrap();
    static ref SUBQUERY: Regex = Regex::new(r"(?i)\(\s*select\b").unwrap();
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EstimatedCost {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueryComplexity {
    pub join_count: usize,
    pub has_group_by: bool,
    pub has_order_by: bool,
    pub has_aggregation: bool,
    pub has_subquery: bool,
    pub has_limit: bool,
    pub estimated_cost: EstimatedCost,
}

pub fn estimate_complexity(sql: &str) -> QueryComplexity {
    let joins = join_count(sql);
    let has_group_by = GROUP_BY.is_match(sql);
    let has_order_by = ORDER_BY.is_match(sql);
    let has_aggregation = AGGREGATE.is_match(sql);
    let has_subquery = SUBQUERY.is_match(sql);
    let has_limit = has_limit(sql);

    let mut score = joins as i64 * 2;
    score += has_group_by as i64;
    score += has_aggregation as i64;
    score += if has_subquery { 3 } else { 0 };
    score -= has_limit as i64;

    let estimated_cost = match score {
        s if s <= 3 => EstimatedCost::Low,
        s if s <= 7 => EstimatedCost::Medium,
        _ => EstimatedCost::High,
    };

    QueryComplexity {
        join_count: joins,
        has_group_by,
        has_order_by,
        has_aggregation,
        has_subquery,
        has_limit,
        estimated_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_aggregate_is_low() {
        let c = estimate_complexity(
            "SELECT SUM(ft.value) FROM finance_transactions ft JOIN accounts a ON ft.account_id = a.account_id LIMIT 1",
        );
        assert_eq!(c.join_count, 1);
        assert!(c.has_aggregation);
        assert!(c.has_limit);
        assert_eq!(c.estimated_cost, EstimatedCost::Low);
    }

    #[test]
    fn test_nested_grouped_query_is_high() {
        let sql = "SELECT a.name, SUM(ft.value) FROM finance_transactions ft \
                   JOIN accounts a ON ft.account_id = a.account_id \
                   JOIN accounts b ON b.account_id = a.account_id \
                   WHERE ft.value > (SELECT AVG(value) FROM finance_transactions) \
                   GROUP BY a.name ORDER BY 2 DESC";
        let c = estimate_complexity(sql);
        assert!(c.has_subquery);
        assert!(c.has_group_by);
        assert!(c.has_order_by);
        assert_eq!(c.estimated_cost, EstimatedCost::High);
    }
}
