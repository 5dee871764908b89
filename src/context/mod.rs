//! Context optimization between agent steps.
//!
//! Keeps the serialized history inside the configured token budget in two
//! stages: lossless dictionary compression of large tool outputs first,
//! then, only if still over budget, summarization of the oldest
//! non-pinned messages through the external summarizer. Compression changes
//! only the stored representation; `materialize` reverses it before
//! anything reaches the model or the user.

use std::sync::Arc;

use async_trait::async_trait;

use crate::compression::{CompressionOptions, compress};
use crate::config::AgentConfig;
use crate::domain::{ChatMessage, Message, Role};
use crate::llm::{LlmError, LlmProvider};

/// Prompt prefix for the context-compaction summarizer.
const SUMMARIZATION_PROMPT: &str = "Summarize the following agent conversation context concisely, \
     preserving all key decisions, file paths, action results, and current task state:\n\n";

/// Prefix of the synthetic message that replaces a summarized range.
const SUMMARY_HEADER: &str = "[Context Summary]\n";

/// Fallback summary length when the summarizer itself fails.
const FALLBACK_SUMMARY_CHARS: usize = 2000;

/// Compression below this ratio is not worth keeping.
const MIN_COMPRESSION_GAIN: f64 = 0.95;

/// An LLM call specialized for context compaction.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a concise summary of the given context text.
    async fn summarize(&self, text: &str) -> Result<String, LlmError>;
}

/// Summarizer that delegates to an LLM provider.
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
}

impl LlmSummarizer {
    /// Create a summarizer on top of a provider.
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, LlmError> {
        let prompt = format!("{SUMMARIZATION_PROMPT}{text}");
        self.provider.complete(&[ChatMessage::user(prompt)]).await
    }
}

/// Middleware that keeps the message list inside the token budget.
pub struct ContextOptimizer {
    token_threshold: usize,
    large_message_ratio: f64,
    compression_enabled: bool,
    compression_opts: CompressionOptions,
    pinned_recent: usize,
    summarizer: Arc<dyn Summarizer>,
}

impl ContextOptimizer {
    /// Create an optimizer from configuration.
    pub fn new(config: &AgentConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            token_threshold: config.context_token_threshold,
            large_message_ratio: config.large_message_ratio,
            compression_enabled: config.compression_enabled,
            compression_opts: CompressionOptions {
                min_chars: config.compression_min_chars,
                min_tokens: config.compression_min_tokens,
                max_entries: config.compression_max_entries,
            },
            pinned_recent: config.context_pinned_recent,
            summarizer,
        }
    }

    /// Estimated token size of the whole history as stored.
    pub fn total_size(history: &[Message]) -> usize {
        history.iter().map(Message::size_estimate).sum()
    }

    /// Run the optimization passes. Idempotent: re-running on its own
    /// output changes nothing. Never fails: when the summarizer errors,
    /// the affected range is truncated instead.
    pub async fn optimize(&self, mut history: Vec<Message>) -> Vec<Message> {
        if Self::total_size(&history) <= self.token_threshold {
            return history;
        }

        if self.compression_enabled {
            self.pass_compress(&mut history);
            if Self::total_size(&history) <= self.token_threshold {
                return history;
            }
        }

        self.pass_summarize(&mut history).await;
        history
    }

    /// Decompress every message into the plain role/content form sent to
    /// the model. The model only ever sees original content.
    pub fn materialize(&self, history: &[Message]) -> Vec<ChatMessage> {
        history
            .iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.logical_content(),
            })
            .collect()
    }

    /// Lossless pass: dictionary-compress large tool-output messages,
    /// oldest first, stopping as soon as the total is back under budget.
    /// Pinning does not apply here; compression never loses information.
    fn pass_compress(&self, history: &mut [Message]) {
        let large_limit = (self.token_threshold as f64 * self.large_message_ratio) as usize;

        for i in 0..history.len() {
            let message = &mut history[i];
            if message.is_compressed()
                || message.source_action.is_none()
                || message.size_estimate() <= large_limit
            {
                continue;
            }

            let original = message.logical_content();
            let (compressed, dict) = compress(&original, &self.compression_opts);
            if dict.is_empty() {
                continue;
            }
            let ratio = compressed.len() as f64 / original.len().max(1) as f64;
            if ratio >= MIN_COMPRESSION_GAIN {
                continue;
            }

            log::info!(
                "compressed {} output: {} -> {} chars",
                message.source_action.as_deref().unwrap_or("tool"),
                original.len(),
                compressed.len()
            );
            *message = message.clone().into_compressed(compressed, dict);

            if Self::total_size(history) <= self.token_threshold {
                break;
            }
        }
    }

    /// Lossy pass: replace the oldest non-pinned messages with one
    /// synthetic summary. The system prompt and the most recent messages
    /// stay untouched; only content already superseded by later turns is
    /// summarized.
    async fn pass_summarize(&self, history: &mut Vec<Message>) {
        let head = Self::pinned_head(history);
        let tail_start = history.len().saturating_sub(self.pinned_recent);
        if tail_start <= head {
            return;
        }

        let middle = &history[head..tail_start];
        if middle.is_empty() || (middle.len() == 1 && middle[0].summary) {
            return;
        }

        // The summarizer reads the original text, never the compressed form;
        // dictionaries of summarized messages are discarded with them.
        let combined = middle
            .iter()
            .map(|m| format!("[{}]: {}", m.role.as_str(), m.logical_content()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let summary = match self.summarizer.summarize(&combined).await {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!("summarization failed ({e}), truncating instead");
                truncate_chars(&combined, FALLBACK_SUMMARY_CHARS)
            }
        };

        let replacement = Message::context_summary(format!("{SUMMARY_HEADER}{summary}"));
        history.splice(head..tail_start, [replacement]);
    }

    /// Leading pinned messages: the system prompt plus the opening task
    /// message.
    fn pinned_head(history: &[Message]) -> usize {
        let system = history
            .iter()
            .take_while(|m| m.role == Role::System)
            .count();
        (system + 1).min(history.len())
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max).collect();
    format!("{truncated}\n... (truncated)")
}
