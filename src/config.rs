//! Runtime configuration loaded from the environment

use crate::error::AnalystError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:financial_data.db";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub model_timeout: Duration,
    /// Financial store the executor reads from
    pub database_url: String,
    /// Conversation store; `None` keeps conversations in process memory
    pub conversation_database_url: Option<String>,
    pub max_context_tokens: usize,
    pub query_timeout: Duration,
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            model_timeout: Duration::from_secs(60),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            conversation_database_url: None,
            max_context_tokens: 4000,
            query_timeout: Duration::from_secs(30),
            history_limit: 20,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = Self::default();

        let config = Self {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            model_timeout: match get("MODEL_TIMEOUT_SECS") {
                Some(raw) => Duration::from_secs(parse_number("MODEL_TIMEOUT_SECS", &raw)?),
                None => defaults.model_timeout,
            },
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            conversation_database_url: get("CONVERSATION_DATABASE_URL"),
            max_context_tokens: match get("MAX_CONTEXT_TOKENS") {
                Some(raw) => parse_number("MAX_CONTEXT_TOKENS", &raw)?,
                None => defaults.max_context_tokens,
            },
            query_timeout: match get("QUERY_TIMEOUT_SECS") {
                Some(raw) => Duration::from_secs(parse_number("QUERY_TIMEOUT_SECS", &raw)?),
                None => defaults.query_timeout,
            },
            history_limit: match get("HISTORY_LIMIT") {
                Some(raw) => parse_number("HISTORY_LIMIT", &raw)?,
                None => defaults.history_limit,
            },
        };

        info!(
            model = %config.gemini_model,
            database = %config.database_url,
            conversation_store = if config.conversation_database_url.is_some() { "sqlite" } else { "in-memory" },
            "Configuration loaded"
        );

        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        AnalystError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.max_context_tokens, 4000);
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert!(config.conversation_database_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "key"),
            ("QUERY_TIMEOUT_SECS", "5"),
            ("CONVERSATION_DATABASE_URL", "sqlite:chat.db"),
            ("HISTORY_LIMIT", " "),
        ]))
        .unwrap();

        assert_eq!(config.gemini_api_key, "key");
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.conversation_database_url.as_deref(), Some("sqlite:chat.db"));
        assert_eq!(config.history_limit, 20);
    }

    #[test]
    fn test_malformed_number_is_config_error() {
        let result = AppConfig::from_lookup(lookup(&[("MAX_CONTEXT_TOKENS", "lots")]));
        assert!(matches!(result, Err(AnalystError::Config(_))));
    }
}
