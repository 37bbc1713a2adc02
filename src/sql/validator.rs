//! SQL safety gate
//!
//! Deterministic accept/reject over the unmodified candidate. Rules run in a
//! fixed order and the first violation wins.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::AnalystError;
use crate::models::ValidationOutcome;
use crate::schema::KNOWN_RELATIONS;
use crate::Result;

pub const MAX_QUERY_LENGTH: usize = 5000;
pub const MAX_JOINS: usize = 5;

/// Keywords rejected anywhere in the candidate, matched as whole words.
pub const PROHIBITED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE", "PRAGMA", "ATTACH", "DETACH", "REPLACE", "RENAME",
];

lazy_static! {
    static ref READ_ONLY_PREFIX: Regex = Regex::new(r"(?i)^\s*(select|with)\b").unwrap();
    static ref JOIN_WORD: Regex = Regex::new(r"(?i)\bjoin\b").unwrap();
    static ref LIMIT_WORD: Regex = Regex::new(r"(?i)\blimit\b").unwrap();
    static ref KEYWORD_PATTERNS: Vec<(&'static str, Regex)> = PROHIBITED_KEYWORDS
        .iter()
        .map(|keyword| {
            let pattern = format!(r"(?i)\b{}\b", keyword);
            (*keyword, Regex::new(&pattern).unwrap())
        })
        .collect();
}

/// Whole-word `JOIN` occurrences.
pub fn join_count(sql: &str) -> usize {
    JOIN_WORD.find_iter(sql).count()
}

pub fn has_limit(sql: &str) -> bool {
    LIMIT_WORD.is_match(sql)
}

/// One check of the safety gate. `None` means the candidate passed.
pub trait SafetyRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, candidate: &str) -> Option<String>;
}

pub struct NonEmptyWithinLength {
    pub max_length: usize,
}

impl SafetyRule for NonEmptyWithinLength {
    fn name(&self) -> &'static str {
        "non_empty_within_length"
    }

    fn check(&self, candidate: &str) -> Option<String> {
        if candidate.trim().is_empty() {
            return Some("Query is empty".to_string());
        }
        if candidate.chars().count() > self.max_length {
            return Some(format!(
                "Query exceeds maximum length of {} characters",
                self.max_length
            ));
        }
        None
    }
}

pub struct ReadOnlyStatement;

impl SafetyRule for ReadOnlyStatement {
    fn name(&self) -> &'static str {
        "read_only_statement"
    }

    fn check(&self, candidate: &str) -> Option<String> {
        if READ_ONLY_PREFIX.is_match(candidate) {
            None
        } else {
            Some("Query must be a SELECT or WITH statement (read-only)".to_string())
        }
    }
}

pub struct ProhibitedKeywords;

impl SafetyRule for ProhibitedKeywords {
    fn name(&self) -> &'static str {
        "prohibited_keywords"
    }

    fn check(&self, candidate: &str) -> Option<String> {
        KEYWORD_PATTERNS
            .iter()
            .find(|(_, pattern)| pattern.is_match(candidate))
            .map(|(keyword, _)| format!("Prohibited SQL keyword detected: {}", keyword))
    }
}

/// Only a single trailing terminator is tolerated.
pub struct SingleStatement;

impl SafetyRule for SingleStatement {
    fn name(&self) -> &'static str {
        "single_statement"
    }

    fn check(&self, candidate: &str) -> Option<String> {
        let semicolons = candidate.matches(';').count();
        let trailing = candidate.trim_end().ends_with(';');

        if semicolons > 1 || (semicolons == 1 && !trailing) {
            Some("Multiple SQL statements or inline semicolons not allowed".to_string())
        } else {
            None
        }
    }
}

pub struct NoComments;

impl SafetyRule for NoComments {
    fn name(&self) -> &'static str {
        "no_comments"
    }

    fn check(&self, candidate: &str) -> Option<String> {
        if ["--", "/*", "*/"].iter().any(|token| candidate.contains(token)) {
            Some("SQL comments not allowed".to_string())
        } else {
            None
        }
    }
}

pub struct KnownRelations;

impl SafetyRule for KnownRelations {
    fn name(&self) -> &'static str {
        "known_relations"
    }

    fn check(&self, candidate: &str) -> Option<String> {
        let lower = candidate.to_lowercase();
        if KNOWN_RELATIONS.iter().any(|relation| lower.contains(relation)) {
            None
        } else {
            Some("Query must reference valid tables: accounts or finance_transactions".to_string())
        }
    }
}

pub struct JoinLimit {
    pub max_joins: usize,
}

impl SafetyRule for JoinLimit {
    fn name(&self) -> &'static str {
        "join_limit"
    }

    fn check(&self, candidate: &str) -> Option<String> {
        let joins = join_count(candidate);
        if joins > self.max_joins {
            Some(format!(
                "Too many JOINs ({}). Maximum allowed: {}",
                joins, self.max_joins
            ))
        } else {
            None
        }
    }
}

/// Ordered rule engine; short-circuits on the first failing rule.
pub struct SqlValidator {
    rules: Vec<Box<dyn SafetyRule>>,
}

impl SqlValidator {
    /// Empty engine. Use [`SqlValidator::default`] for the standard gate.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn SafetyRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn validate(&self, candidate: &str) -> ValidationOutcome {
        for rule in &self.rules {
            if let Some(message) = rule.check(candidate) {
                warn!(rule = rule.name(), reason = %message, "SQL rejected by safety gate");
                return ValidationOutcome::rejected(message);
            }
        }

        if !has_limit(candidate) {
            debug!("Query has no LIMIT clause, sanitizer will add one");
        }

        ValidationOutcome::accepted()
    }

    /// [`SqlValidator::validate`] as a `Result`, for callers that propagate.
    pub fn ensure_valid(&self, candidate: &str) -> Result<()> {
        let outcome = self.validate(candidate);
        if outcome.valid {
            Ok(())
        } else {
            Err(AnalystError::ValidationRejected(outcome.message))
        }
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        let mut validator = Self::new();
        validator.add_rule(Box::new(NonEmptyWithinLength {
            max_length: MAX_QUERY_LENGTH,
        }));
        validator.add_rule(Box::new(ReadOnlyStatement));
        validator.add_rule(Box::new(ProhibitedKeywords));
        validator.add_rule(Box::new(SingleStatement));
        validator.add_rule(Box::new(NoComments));
        validator.add_rule(Box::new(KnownRelations));
        validator.add_rule(Box::new(JoinLimit {
            max_joins: MAX_JOINS,
        }));
        validator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVENUE: &str = "SELECT SUM(ft.value) AS total_revenue FROM finance_transactions ft \
                           JOIN accounts a ON ft.account_id = a.account_id WHERE a.type = 1";

    fn reject_message(sql: &str) -> String {
        let outcome = SqlValidator::default().validate(sql);
        assert!(!outcome.valid, "expected rejection for {}", sql);
        outcome.message
    }

    #[test]
    fn test_accepts_plain_select_and_cte() {
        let validator = SqlValidator::default();
        assert!(validator.validate(REVENUE).valid);
        assert!(validator.validate(&format!("{};", REVENUE)).valid);
        assert!(validator
            .validate("WITH r AS (SELECT * FROM accounts) SELECT * FROM r LIMIT 5")
            .valid);
        assert!(validator.validate("  select name from accounts").valid);
    }

    #[test]
    fn test_empty_and_overlong() {
        assert_eq!(reject_message(""), "Query is empty");
        assert_eq!(reject_message("   "), "Query is empty");

        let long = format!("SELECT * FROM accounts WHERE name = '{}'", "x".repeat(MAX_QUERY_LENGTH));
        assert_eq!(
            reject_message(&long),
            "Query exceeds maximum length of 5000 characters"
        );
    }

    #[test]
    fn test_rejects_non_read_only_prefix() {
        for sql in [
            "DELETE FROM accounts",
            "EXPLAIN SELECT * FROM accounts",
            "(SELECT * FROM accounts)",
            "selection FROM accounts",
        ] {
            assert_eq!(
                reject_message(sql),
                "Query must be a SELECT or WITH statement (read-only)"
            );
        }
    }

    #[test]
    fn test_every_prohibited_keyword_is_named() {
        for keyword in PROHIBITED_KEYWORDS {
            let sql = format!("SELECT * FROM accounts WHERE x = 1 {} y", keyword.to_lowercase());
            let message = reject_message(&sql);
            assert!(message.contains("Prohibited SQL keyword detected"));
            assert!(message.contains(keyword), "{} not named in {}", keyword, message);
        }
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let validator = SqlValidator::default();
        let sql = "SELECT created_by, last_updated, dropdown FROM finance_transactions LIMIT 5";
        assert!(validator.validate(sql).valid);
    }

    #[test]
    fn test_drop_table_named() {
        let message = reject_message("SELECT * FROM accounts; DROP TABLE accounts;");
        assert_eq!(message, "Prohibited SQL keyword detected: DROP");
    }

    #[test]
    fn test_statement_stacking() {
        let expected = "Multiple SQL statements or inline semicolons not allowed";
        assert_eq!(reject_message("SELECT * FROM accounts; SELECT 1"), expected);
        assert_eq!(reject_message("SELECT * FROM accounts;;"), expected);
    }

    #[test]
    fn test_comments_rejected() {
        for sql in [
            "SELECT * FROM accounts -- trailing",
            "SELECT /* hidden */ * FROM accounts",
            "SELECT * FROM accounts */",
        ] {
            assert_eq!(reject_message(sql), "SQL comments not allowed");
        }
    }

    #[test]
    fn test_unknown_relation() {
        assert_eq!(
            reject_message("SELECT * FROM users"),
            "Query must reference valid tables: accounts or finance_transactions"
        );
    }

    #[test]
    fn test_join_limit() {
        let joins = " JOIN accounts a ON 1 = 1".repeat(6);
        let sql = format!("SELECT * FROM finance_transactions ft{}", joins);
        assert_eq!(reject_message(&sql), "Too many JOINs (6). Maximum allowed: 5");

        let five = " join accounts a ON 1 = 1".repeat(5);
        let sql = format!("SELECT * FROM finance_transactions ft{}", five);
        assert!(SqlValidator::default().validate(&sql).valid);
    }

    #[test]
    fn test_rule_order_short_circuits() {
        // Prefix check fires before the keyword check.
        assert_eq!(
            reject_message("DROP TABLE accounts"),
            "Query must be a SELECT or WITH statement (read-only)"
        );
        assert_eq!(
            SqlValidator::default().rule_names(),
            vec![
                "non_empty_within_length",
                "read_only_statement",
                "prohibited_keywords",
                "single_statement",
                "no_comments",
                "known_relations",
                "join_limit",
            ]
        );
    }

    #[test]
    fn test_ensure_valid_maps_to_error() {
        let validator = SqlValidator::default();
        assert!(validator.ensure_valid(REVENUE).is_ok());
        assert!(matches!(
            validator.ensure_valid("SELECT 1"),
            Err(AnalystError::ValidationRejected(_))
        ));
    }
}
