//! Conversation memory
//!
//! Sessions, append-only turns, and token-bounded retrieval of prior-turn
//! summaries for prompt grounding.

pub mod conversation;
pub mod store;
pub mod token_manager;

pub use conversation::{generate_chat_id, ConversationMemory};
pub use store::{ChatStatistics, NewTurn, Session, Turn, TurnOrder, TurnRole, MAX_STORED_DATA_POINTS};
pub use token_manager::{
    recency_label, TokenBudget, TokenManager, FORMATTING_RESERVED_TOKENS, GENERATION_RESERVED_TOKENS,
    NO_HISTORY,
};
