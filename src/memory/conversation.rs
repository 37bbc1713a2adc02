//! Durable conversation memory
//!
//! Sessions and their turns, kept in process memory or in SQLite. Reads are
//! newest first unless a caller asks for [`TurnOrder::OldestFirst`].

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::{ChatStatistics, NewTurn, Session, Turn, TurnOrder, TurnRole};
use super::token_manager::TokenManager;
use crate::config::AppConfig;
use crate::error::AnalystError;
use crate::Result;

struct SessionState {
    session: Session,
    turns: Vec<Turn>,
}

enum MemoryBackend {
    InMemory {
        sessions: Arc<RwLock<HashMap<String, SessionState>>>,
        next_id: AtomicI64,
    },
    Sqlite {
        pool: SqlitePool,
        schema_ready: Arc<OnceCell<()>>,
    },
}

pub struct ConversationMemory {
    backend: MemoryBackend,
    token_manager: TokenManager,
}

/// `chat_<YYYYmmdd_HHMMSS>_<user|anonymous>_<8 hex>`
pub fn generate_chat_id(user_id: Option<&str>) -> String {
    let user = user_id
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or("anonymous");
    let short = Uuid::new_v4().simple().to_string();

    format!(
        "chat_{}_{}_{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        user,
        &short[..8]
    )
}

fn storage_error(context: &str) -> impl Fn(sqlx::Error) -> AnalystError + '_ {
    move |e| AnalystError::Storage(format!("{}: {}", context, e))
}

fn unknown_session(chat_id: &str) -> AnalystError {
    AnalystError::Storage(format!("Unknown chat session: {}", chat_id))
}

impl ConversationMemory {
    pub fn in_memory() -> Self {
        Self {
            backend: MemoryBackend::InMemory {
                sessions: Arc::new(RwLock::new(HashMap::new())),
                next_id: AtomicI64::new(1),
            },
            token_manager: TokenManager::default(),
        }
    }

    /// SQLite-backed memory. Tables are created on first use.
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            backend: MemoryBackend::Sqlite {
                pool,
                schema_ready: Arc::new(OnceCell::new()),
            },
            token_manager: TokenManager::default(),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(storage_error("Invalid conversation database url"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(storage_error("Failed to open conversation database"))?;

        Ok(Self::sqlite(pool))
    }

    /// SQLite when `CONVERSATION_DATABASE_URL` is set and reachable, otherwise
    /// process memory.
    pub async fn from_config(config: &AppConfig) -> Self {
        let memory = match &config.conversation_database_url {
            Some(url) => match Self::connect(url).await {
                Ok(memory) => {
                    info!("Conversation memory backend: sqlite");
                    memory
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize sqlite memory backend, falling back to in-memory: {}",
                        error
                    );
                    Self::in_memory()
                }
            },
            None => {
                info!("Conversation memory backend: in-memory");
                Self::in_memory()
            }
        };

        memory.with_token_manager(TokenManager::new(config.max_context_tokens))
    }

    pub fn with_token_manager(mut self, token_manager: TokenManager) -> Self {
        self.token_manager = token_manager;
        self
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.token_manager
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let MemoryBackend::Sqlite { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_sessions (
                      chat_id TEXT PRIMARY KEY,
                      user_id TEXT,
                      created_at TIMESTAMP NOT NULL,
                      last_activity TIMESTAMP NOT NULL,
                      context_summary TEXT NOT NULL DEFAULT ''
                    )
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_messages (
                      id INTEGER PRIMARY KEY AUTOINCREMENT,
                      chat_id TEXT NOT NULL REFERENCES chat_sessions (chat_id),
                      message_type TEXT NOT NULL,
                      content TEXT NOT NULL,
                      query_intent TEXT,
                      data_points TEXT,
                      prompt TEXT,
                      llm_response TEXT,
                      summary TEXT,
                      token_count INTEGER,
                      timestamp TIMESTAMP NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_chat_messages_chat_time
                    ON chat_messages (chat_id, timestamp)
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(storage_error("Failed to initialize conversation schema"))?;

        Ok(())
    }

    fn session_from_row(row: &SqliteRow) -> Result<Session> {
        let read = storage_error("Failed to read chat session");
        Ok(Session {
            chat_id: row.try_get("chat_id").map_err(&read)?,
            user_id: row.try_get("user_id").map_err(&read)?,
            created_at: row.try_get("created_at").map_err(&read)?,
            last_activity: row.try_get("last_activity").map_err(&read)?,
            context_summary: row
                .try_get::<Option<String>, _>("context_summary")
                .map_err(&read)?
                .unwrap_or_default(),
        })
    }

    fn turn_from_row(row: &SqliteRow) -> Result<Turn> {
        let read = storage_error("Failed to read chat message");
        let role: String = row.try_get("message_type").map_err(&read)?;
        let data_points: Option<String> = row.try_get("data_points").map_err(&read)?;
        let token_count: Option<i64> = row.try_get("token_count").map_err(&read)?;

        Ok(Turn {
            id: row.try_get("id").map_err(&read)?,
            chat_id: row.try_get("chat_id").map_err(&read)?,
            role: TurnRole::from_db(&role),
            content: row.try_get("content").map_err(&read)?,
            intent: row.try_get("query_intent").map_err(&read)?,
            data_points: match data_points {
                Some(json) if !json.is_empty() => serde_json::from_str(&json)?,
                _ => Vec::new(),
            },
            prompt: row.try_get("prompt").map_err(&read)?,
            raw_model_response: row.try_get("llm_response").map_err(&read)?,
            summary: row.try_get("summary").map_err(&read)?,
            token_estimate: token_count.map(|count| count.max(0) as usize),
            timestamp: row.try_get("timestamp").map_err(&read)?,
        })
    }

    /// Fetch the session, creating it on first use.
    pub async fn get_or_create_session(&self, chat_id: &str, user_id: Option<&str>) -> Result<Session> {
        match &self.backend {
            MemoryBackend::InMemory { sessions, .. } => {
                {
                    let locked = sessions.read().await;
                    if let Some(state) = locked.get(chat_id) {
                        return Ok(state.session.clone());
                    }
                }

                let mut locked = sessions.write().await;
                let state = locked.entry(chat_id.to_string()).or_insert_with(|| {
                    debug!(chat_id, "Creating chat session");
                    SessionState {
                        session: Session::new(chat_id, user_id.map(str::to_string)),
                        turns: Vec::new(),
                    }
                });

                Ok(state.session.clone())
            }
            MemoryBackend::Sqlite { pool, .. } => {
                self.ensure_schema_if_needed().await?;
                let now = Utc::now();

                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO chat_sessions
                      (chat_id, user_id, created_at, last_activity, context_summary)
                    VALUES (?, ?, ?, ?, '')
                    "#,
                )
                .bind(chat_id)
                .bind(user_id)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .map_err(storage_error("Failed to create chat session"))?;

                self.get_session(chat_id)
                    .await?
                    .ok_or_else(|| unknown_session(chat_id))
            }
        }
    }

    pub async fn get_session(&self, chat_id: &str) -> Result<Option<Session>> {
        match &self.backend {
            MemoryBackend::InMemory { sessions, .. } => {
                let locked = sessions.read().await;
                Ok(locked.get(chat_id).map(|state| state.session.clone()))
            }
            MemoryBackend::Sqlite { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let row = sqlx::query(
                    r#"
                    SELECT chat_id, user_id, created_at, last_activity, context_summary
                    FROM chat_sessions WHERE chat_id = ?
                    "#,
                )
                .bind(chat_id)
                .fetch_optional(pool)
                .await
                .map_err(storage_error("Failed to load chat session"))?;

                row.as_ref().map(Self::session_from_row).transpose()
            }
        }
    }

    /// Append one turn and touch the session's last activity.
    pub async fn append_turn(&self, chat_id: &str, turn: NewTurn) -> Result<Turn> {
        self.append_turns(chat_id, vec![turn])
            .await?
            .pop()
            .ok_or_else(|| unknown_session(chat_id))
    }

    /// Append a user turn and its answer together. Either both are stored
    /// or neither is.
    pub async fn append_exchange(&self, chat_id: &str, user: NewTurn, assistant: NewTurn) -> Result<(Turn, Turn)> {
        let mut stored = self.append_turns(chat_id, vec![user, assistant]).await?.into_iter();

        match (stored.next(), stored.next()) {
            (Some(user), Some(assistant)) => Ok((user, assistant)),
            _ => Err(AnalystError::Storage(format!(
                "Incomplete exchange stored for chat session: {}",
                chat_id
            ))),
        }
    }

    /// Store `turns` in order within one transaction.
    async fn append_turns(&self, chat_id: &str, turns: Vec<NewTurn>) -> Result<Vec<Turn>> {
        let now = Utc::now();

        match &self.backend {
            MemoryBackend::InMemory { sessions, next_id } => {
                let mut locked = sessions.write().await;
                let state = locked.get_mut(chat_id).ok_or_else(|| unknown_session(chat_id))?;

                let stored: Vec<Turn> = turns
                    .into_iter()
                    .map(|turn| turn.into_turn(next_id.fetch_add(1, Ordering::SeqCst), chat_id, now))
                    .collect();
                state.turns.extend(stored.iter().cloned());
                state.session.last_activity = now;

                Ok(stored)
            }
            MemoryBackend::Sqlite { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let mut tx = pool
                    .begin()
                    .await
                    .map_err(storage_error("Failed to begin transaction for chat message"))?;

                let touched = sqlx::query("UPDATE chat_sessions SET last_activity = ? WHERE chat_id = ?")
                    .bind(now)
                    .bind(chat_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error("Failed to update session activity"))?;

                if touched.rows_affected() == 0 {
                    return Err(unknown_session(chat_id));
                }

                let mut stored = Vec::with_capacity(turns.len());
                for turn in turns {
                    let data_points = if turn.data_points.is_empty() {
                        None
                    } else {
                        Some(serde_json::to_string(&turn.data_points)?)
                    };

                    let inserted = sqlx::query(
                        r#"
                        INSERT INTO chat_messages
                          (chat_id, message_type, content, query_intent, data_points,
                           prompt, llm_response, summary, token_count, timestamp)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(chat_id)
                    .bind(turn.role.as_str())
                    .bind(&turn.content)
                    .bind(&turn.intent)
                    .bind(data_points)
                    .bind(&turn.prompt)
                    .bind(&turn.raw_model_response)
                    .bind(&turn.summary)
                    .bind(turn.token_estimate.map(|t| t as i64))
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error("Failed to insert chat message"))?;

                    stored.push(turn.into_turn(inserted.last_insert_rowid(), chat_id, now));
                }

                tx.commit()
                    .await
                    .map_err(storage_error("Failed to commit chat message"))?;

                Ok(stored)
            }
        }
    }

    /// Up to `limit` turns in the requested order.
    pub async fn turns(&self, chat_id: &str, limit: usize, order: TurnOrder) -> Result<Vec<Turn>> {
        match &self.backend {
            MemoryBackend::InMemory { sessions, .. } => {
                let locked = sessions.read().await;
                let Some(state) = locked.get(chat_id) else {
                    return Ok(Vec::new());
                };

                let mut turns = state.turns.clone();
                turns.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
                turns.truncate(limit);
                if order == TurnOrder::OldestFirst {
                    turns.reverse();
                }
                Ok(turns)
            }
            MemoryBackend::Sqlite { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                // Newest `limit` turns, then flipped if the caller wants oldest first.
                let rows = sqlx::query(
                    r#"
                    SELECT id, chat_id, message_type, content, query_intent, data_points,
                           prompt, llm_response, summary, token_count, timestamp
                    FROM chat_messages
                    WHERE chat_id = ?
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(chat_id)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(storage_error("Failed to load chat messages"))?;

                let mut turns = rows.iter().map(Self::turn_from_row).collect::<Result<Vec<_>>>()?;
                if order == TurnOrder::OldestFirst {
                    turns.reverse();
                }
                Ok(turns)
            }
        }
    }

    /// Last `limit` turns, newest first.
    pub async fn recent_turns(&self, chat_id: &str, limit: usize) -> Result<Vec<Turn>> {
        self.turns(chat_id, limit, TurnOrder::NewestFirst).await
    }

    /// Non-empty assistant summaries, newest first.
    pub async fn recent_summaries(&self, chat_id: &str, limit: usize) -> Result<Vec<String>> {
        match &self.backend {
            MemoryBackend::InMemory { .. } => {
                let turns = self.recent_turns(chat_id, usize::MAX).await?;
                Ok(turns
                    .into_iter()
                    .filter_map(|turn| turn.summary)
                    .filter(|summary| !summary.trim().is_empty())
                    .take(limit)
                    .collect())
            }
            MemoryBackend::Sqlite { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let rows = sqlx::query(
                    r#"
                    SELECT summary FROM chat_messages
                    WHERE chat_id = ? AND summary IS NOT NULL AND TRIM(summary) != ''
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(chat_id)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(storage_error("Failed to load conversation summaries"))?;

                rows.iter()
                    .map(|row| row.try_get::<String, _>("summary"))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(storage_error("Failed to read conversation summary"))
            }
        }
    }

    /// Newest turns whose estimated content cost fits in `max_tokens`,
    /// stopping at the first turn that would overflow. Newest first.
    pub async fn turns_within_budget(&self, chat_id: &str, max_tokens: usize, limit: usize) -> Result<Vec<Turn>> {
        let mut used = 0;
        let mut selected = Vec::new();

        for turn in self.recent_turns(chat_id, limit).await? {
            let cost = self.token_manager.estimate(&turn.content);
            if used + cost > max_tokens {
                break;
            }
            used += cost;
            selected.push(turn);
        }

        Ok(selected)
    }

    /// Recent summaries formatted with recency labels inside the budget left
    /// after `reserved` tokens.
    pub async fn history_within_budget(&self, chat_id: &str, reserved: usize, limit: usize) -> Result<String> {
        let summaries = self.recent_summaries(chat_id, limit).await?;
        Ok(self.token_manager.select(&summaries, reserved))
    }

    pub async fn update_context_summary(&self, chat_id: &str, summary: &str) -> Result<()> {
        match &self.backend {
            MemoryBackend::InMemory { sessions, .. } => {
                let mut locked = sessions.write().await;
                let state = locked.get_mut(chat_id).ok_or_else(|| unknown_session(chat_id))?;
                state.session.context_summary = summary.to_string();
                Ok(())
            }
            MemoryBackend::Sqlite { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let updated = sqlx::query("UPDATE chat_sessions SET context_summary = ? WHERE chat_id = ?")
                    .bind(summary)
                    .bind(chat_id)
                    .execute(pool)
                    .await
                    .map_err(storage_error("Failed to update context summary"))?;

                if updated.rows_affected() == 0 {
                    return Err(unknown_session(chat_id));
                }
                Ok(())
            }
        }
    }

    /// Remove turns for one session, or for all sessions when `chat_id` is
    /// `None`, and reset the rolling summaries. Sessions themselves remain.
    /// Returns the number of turns removed.
    pub async fn clear(&self, chat_id: Option<&str>) -> Result<u64> {
        let removed = match &self.backend {
            MemoryBackend::InMemory { sessions, .. } => {
                let mut locked = sessions.write().await;
                let mut removed = 0;
                for (id, state) in locked.iter_mut() {
                    if chat_id.map_or(true, |wanted| wanted == id.as_str()) {
                        removed += state.turns.len() as u64;
                        state.turns.clear();
                        state.session.context_summary.clear();
                    }
                }
                removed
            }
            MemoryBackend::Sqlite { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let mut tx = pool
                    .begin()
                    .await
                    .map_err(storage_error("Failed to begin transaction for clearing chat"))?;

                let deleted = match chat_id {
                    Some(id) => {
                        let deleted = sqlx::query("DELETE FROM chat_messages WHERE chat_id = ?")
                            .bind(id)
                            .execute(&mut *tx)
                            .await
                            .map_err(storage_error("Failed to clear chat messages"))?;
                        sqlx::query("UPDATE chat_sessions SET context_summary = '' WHERE chat_id = ?")
                            .bind(id)
                            .execute(&mut *tx)
                            .await
                            .map_err(storage_error("Failed to reset context summary"))?;
                        deleted
                    }
                    None => {
                        let deleted = sqlx::query("DELETE FROM chat_messages")
                            .execute(&mut *tx)
                            .await
                            .map_err(storage_error("Failed to clear chat messages"))?;
                        sqlx::query("UPDATE chat_sessions SET context_summary = ''")
                            .execute(&mut *tx)
                            .await
                            .map_err(storage_error("Failed to reset context summaries"))?;
                        deleted
                    }
                };

                tx.commit()
                    .await
                    .map_err(storage_error("Failed to commit chat clear"))?;

                deleted.rows_affected()
            }
        };

        info!(chat_id = chat_id.unwrap_or("*"), removed, "Chat history cleared");
        Ok(removed)
    }

    pub async fn statistics(&self, chat_id: &str) -> Result<ChatStatistics> {
        match &self.backend {
            MemoryBackend::InMemory { sessions, .. } => {
                let locked = sessions.read().await;
                let state = locked.get(chat_id);

                Ok(ChatStatistics {
                    chat_id: chat_id.to_string(),
                    message_count: state.map_or(0, |s| s.turns.len()),
                    total_tokens: state.map_or(0, |s| {
                        s.turns.iter().filter_map(|t| t.token_estimate).sum()
                    }),
                    created_at: state.map(|s| s.session.created_at),
                    last_activity: state.map(|s| s.session.last_activity),
                })
            }
            MemoryBackend::Sqlite { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let row = sqlx::query(
                    r#"
                    SELECT COUNT(*) AS message_count, COALESCE(SUM(token_count), 0) AS total_tokens
                    FROM chat_messages WHERE chat_id = ?
                    "#,
                )
                .bind(chat_id)
                .fetch_one(pool)
                .await
                .map_err(storage_error("Failed to compute chat statistics"))?;

                let read = storage_error("Failed to read chat statistics");
                let message_count: i64 = row.try_get("message_count").map_err(&read)?;
                let total_tokens: i64 = row.try_get("total_tokens").map_err(&read)?;
                let session = self.get_session(chat_id).await?;

                Ok(ChatStatistics {
                    chat_id: chat_id.to_string(),
                    message_count: message_count.max(0) as usize,
                    total_tokens: total_tokens.max(0) as usize,
                    created_at: session.as_ref().map(|s| s.created_at),
                    last_activity: session.as_ref().map(|s| s.last_activity),
                })
            }
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::in_memory()
    }
}
