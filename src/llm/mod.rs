//! Language-model collaborator
//!
//! Both model calls of the pipeline go through [`LanguageModel`]. The real
//! client is built once at startup and shared as `Arc<dyn LanguageModel>`.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::error::AnalystError;
use crate::Result;

pub mod gemini;

pub use gemini::GeminiClient;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` under the `system` instruction and return the raw text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Scripted model for development and tests.
///
/// Replies are returned in the order they were queued. Once the script is
/// exhausted every call fails with `ModelUnavailable`.
pub struct MockModel {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(reply.into()));
    }

    pub async fn push_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(Err(AnalystError::ModelUnavailable(message.into())));
    }

    /// Every prompt received so far, oldest first.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().await.push(prompt.to_string());

        self.replies.lock().await.pop_front().unwrap_or_else(|| {
            Err(AnalystError::ModelUnavailable(
                "mock model has no scripted reply".to_string(),
            ))
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
