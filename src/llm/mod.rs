//! LLM provider interface.
//!
//! The agent core only depends on the `LlmProvider` trait; the concrete
//! backend is a collaborator chosen by the host. An OpenAI-compatible HTTP
//! implementation ships in `openai`, and `ScriptedProvider` serves tests.

mod openai;
mod parser;

pub use openai::OpenAiProvider;
pub use parser::{parse_action, parse_json_object, strip_action_blocks};

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ChatMessage;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },
}

impl LlmError {
    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Api { status, .. } => *status >= 500 || *status == 429,
            LlmError::Network(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::MissingApiKey { .. } => false,
        }
    }
}

/// A chat-completion backend. One call, one reply; retry policy belongs to
/// the caller.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Complete a conversation, returning the assistant reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Provider that replays canned replies in order. For tests and offline
/// exercising of the loop machinery.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    /// Create a provider that returns the given replies in order.
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }

    /// Number of replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("scripted provider lock").len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.replies
            .lock()
            .expect("scripted provider lock")
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
    }
}
