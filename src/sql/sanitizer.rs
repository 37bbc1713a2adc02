//! Normalisation of an already validated query

use super::validator::has_limit;

pub const DEFAULT_ROW_LIMIT: usize = 100;

/// Collapse whitespace, reapply exactly one terminator and add a row limit
/// when the query has none. Idempotent.
pub fn sanitize(validated: &str) -> String {
    let collapsed = validated.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut query = collapsed.trim_end_matches(';').trim_end().to_string();

    if !has_limit(&query) {
        query.push_str(&format!(" LIMIT {}", DEFAULT_ROW_LIMIT));
    }

    query.push(';');
    query
}
