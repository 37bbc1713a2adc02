//! Main orchestrator - one sequential pipeline per query
//!
//! START → SESSION → INTENT → {REFUSE | NO QUERY | VALIDATE → EXECUTE → FORMAT → PERSIST} → DONE
//!
//! Any stage may end in `Failed(kind)`. Every path, failures included,
//! produces a well-formed [`QueryResponse`].

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::execution::{QueryConnection, SafeQueryExecutor};
use crate::formatter::{error_response, ResponseFormatter};
use crate::generator::{Generation, IntentGenerator};
use crate::llm::LanguageModel;
use crate::memory::{generate_chat_id, ConversationMemory, NewTurn};
use crate::models::{
    FormattedAnswer, IntentOrigin, IntentResult, QueryRequest, QueryResponse, QueryResult,
};
use crate::sql::{sanitize, SqlValidator};
use crate::text::truncate_chars;
use crate::Result;

pub mod insights;

pub use insights::extract_insights;

pub const REFUSAL_ANSWER: &str = "I can only retrieve and analyze data, not modify it. Please rephrase your query as a question about the financial data.";
pub const REFUSAL_INSIGHT: &str = "Data modification operations are not permitted";
pub const NO_QUERY_ANSWER: &str = "I couldn't generate a database query for your request. Could you please rephrase your question or provide more details?";

/// Summaries offered to the token manager per call
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Rows returned to the caller
pub const MAX_RESPONSE_DATA_POINTS: usize = 10;

const REFUSAL_CONFIDENCE: f32 = 1.0;
const NO_QUERY_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum FailureKind {
    ModelUnavailable,
    ValidationRejected,
    ExecutionFailed,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    SessionReady,
    IntentResolved,
    Refused,
    NoQuery,
    Validated,
    Executed,
    Formatted,
    Persisted,
    Done,
    Failed(FailureKind),
}

/// A finished pipeline: the answer plus every stage it passed through.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub response: QueryResponse,
    pub stages: Vec<PipelineStage>,
}

impl PipelineRun {
    pub fn terminal_stage(&self) -> Option<PipelineStage> {
        self.stages.last().copied()
    }

    pub fn reached(&self, stage: PipelineStage) -> bool {
        self.stages.contains(&stage)
    }
}

pub struct Orchestrator {
    generator: IntentGenerator,
    validator: SqlValidator,
    executor: SafeQueryExecutor,
    formatter: ResponseFormatter,
    memory: Arc<ConversationMemory>,
    history_limit: usize,
}

impl Orchestrator {
    /// Both model calls share `model`; the memory's token manager bounds both
    /// history blocks.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        connection: Arc<dyn QueryConnection>,
        memory: Arc<ConversationMemory>,
    ) -> Self {
        let token_manager = memory.token_manager().clone();

        Self {
            generator: IntentGenerator::new(model.clone()).with_token_manager(token_manager.clone()),
            validator: SqlValidator::default(),
            executor: SafeQueryExecutor::new(connection),
            formatter: ResponseFormatter::new(model).with_token_manager(token_manager),
            memory,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        model: Arc<dyn LanguageModel>,
        connection: Arc<dyn QueryConnection>,
        memory: Arc<ConversationMemory>,
    ) -> Self {
        Self::new(model, connection, memory)
            .with_query_timeout(config.query_timeout)
            .with_history_limit(config.history_limit)
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.executor = self.executor.with_timeout(timeout);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    /// Answer one query.
    pub async fn handle(&self, request: QueryRequest) -> QueryResponse {
        self.run(request).await.response
    }

    /// Answer one query and report the stages it went through.
    pub async fn run(&self, request: QueryRequest) -> PipelineRun {
        let started = Instant::now();
        let mut stages = vec![PipelineStage::Start];
        let query = request.query.trim().to_string();

        // === SESSION ===
        let chat_id = request
            .chat_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| generate_chat_id(request.user_id.as_deref()));

        info!(
            chat_id = %chat_id,
            query = %truncate_chars(&query, 50),
            "Orchestrator: processing query"
        );

        if let Err(e) = self
            .memory
            .get_or_create_session(&chat_id, request.user_id.as_deref())
            .await
        {
            warn!(chat_id = %chat_id, error = %e, "Session unavailable, continuing without history");
        }
        stages.push(PipelineStage::SessionReady);

        let history = match self.memory.recent_summaries(&chat_id, self.history_limit).await {
            Ok(history) => history,
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Failed to load conversation history");
                Vec::new()
            }
        };

        // === INTENT ===
        let generation = self.generator.generate(&query, &history).await;
        let intent = &generation.result;

        if intent.origin == IntentOrigin::Unavailable {
            let answer = format!(
                "I encountered an error processing your query: {}. Please try rephrasing your question or contact support if the issue persists.",
                intent.reasoning
            );
            return self.fail(stages, FailureKind::ModelUnavailable, &query, answer, &chat_id);
        }
        stages.push(PipelineStage::IntentResolved);

        if intent.is_modification {
            info!(chat_id = %chat_id, "Modification request refused");
            stages.push(PipelineStage::Refused);
            stages.push(PipelineStage::Done);

            let mut response = QueryResponse::new(&query, REFUSAL_ANSWER, REFUSAL_CONFIDENCE, &chat_id);
            response.insights = vec![REFUSAL_INSIGHT.to_string()];
            return PipelineRun { response, stages };
        }

        let Some(candidate) = intent.usable_sql() else {
            info!(chat_id = %chat_id, intent = %intent.intent, "No query generated");
            stages.push(PipelineStage::NoQuery);
            stages.push(PipelineStage::Done);

            let response = QueryResponse::new(&query, NO_QUERY_ANSWER, NO_QUERY_CONFIDENCE, &chat_id);
            return PipelineRun { response, stages };
        };

        // === VALIDATE ===
        // The gate sees the candidate before any normalization.
        let outcome = self.validator.validate(candidate);
        if !outcome.valid {
            let answer = format!(
                "The generated query failed safety validation: {}. Please try rephrasing your question.",
                outcome.message
            );
            return self.fail(stages, FailureKind::ValidationRejected, &query, answer, &chat_id);
        }
        stages.push(PipelineStage::Validated);

        let sql = sanitize(candidate);
        debug!(sql = %sql, "SQL validated and sanitized");

        // === EXECUTE ===
        let rows = match self.executor.execute(&sql).await {
            Ok(rows) => rows,
            Err(e) => {
                let answer = error_response(&e.to_string(), &query);
                return self.fail(stages, FailureKind::ExecutionFailed, &query, answer, &chat_id);
            }
        };
        stages.push(PipelineStage::Executed);

        // === FORMAT ===
        let formatted = self
            .formatter
            .format(&query, &sql, &rows, intent.intent, &history)
            .await;
        stages.push(PipelineStage::Formatted);

        // === PERSIST ===
        match self
            .persist(&chat_id, &query, &generation, &rows, &formatted)
            .await
        {
            Ok(()) => stages.push(PipelineStage::Persisted),
            Err(e) => warn!(chat_id = %chat_id, error = %e, "Failed to persist conversation turn"),
        }

        stages.push(PipelineStage::Done);

        let mut response = QueryResponse::new(&query, formatted.answer_text, intent.confidence, &chat_id);
        response.insights = extract_insights(&rows);
        response.data_points = rows.into_iter().take(MAX_RESPONSE_DATA_POINTS).collect();

        info!(
            chat_id = %chat_id,
            intent = %intent.intent,
            row_count = response.data_points.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query answered"
        );

        PipelineRun { response, stages }
    }

    async fn persist(
        &self,
        chat_id: &str,
        query: &str,
        generation: &Generation,
        rows: &QueryResult,
        formatted: &FormattedAnswer,
    ) -> Result<()> {
        let intent: &IntentResult = &generation.result;
        let token_estimate = self
            .memory
            .token_manager()
            .estimate(&format!("{}{}", query, formatted.answer_text));

        let user = NewTurn::user(query)
            .with_intent(intent.intent)
            .with_data_points(rows)
            .with_token_estimate(token_estimate);

        let mut assistant = NewTurn::assistant(formatted.answer_text.as_str())
            .with_intent(intent.intent)
            .with_data_points(rows)
            .with_prompt(query)
            .with_summary(formatted.context_summary.as_str())
            .with_token_estimate(token_estimate);
        if let Some(raw) = &formatted.raw_response {
            assistant = assistant.with_raw_response(raw.as_str());
        }
        self.memory.append_exchange(chat_id, user, assistant).await?;

        let rolling = format!(
            "Last query: {} - {}...",
            intent.intent,
            truncate_chars(query, 50)
        );
        self.memory.update_context_summary(chat_id, &rolling).await
    }

    fn fail(
        &self,
        mut stages: Vec<PipelineStage>,
        kind: FailureKind,
        query: &str,
        answer: String,
        chat_id: &str,
    ) -> PipelineRun {
        error!(chat_id, failure = ?kind, "Query pipeline failed");
        stages.push(PipelineStage::Failed(kind));

        PipelineRun {
            response: QueryResponse::new(query, answer, 0.0, chat_id),
            stages,
        }
    }
}
