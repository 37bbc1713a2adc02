//! Financial Query Agent
//!
//! Answers natural-language questions about a financial store:
//! - Generates read-only SQL with a language model, grounded in recent turns
//! - Gates every query through a deterministic safety validator
//! - Executes with a timeout and a hard row cap
//! - Formats results into an answer plus a summary for later turns
//! - Persists the conversation so follow-ups can refer back
//!
//! PIPELINE:
//! SESSION → GENERATE → VALIDATE → SANITIZE → EXECUTE → FORMAT → PERSIST

pub mod agent;
pub mod config;
pub mod error;
pub mod execution;
pub mod formatter;
pub mod generator;
pub mod llm;
pub mod memory;
pub mod models;
pub mod schema;
pub mod sql;
pub mod text;

pub use error::{AnalystError, Result};

// Re-export common types
pub use agent::{FailureKind, Orchestrator, PipelineRun, PipelineStage};
pub use config::AppConfig;
pub use models::*;
