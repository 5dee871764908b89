//! Conversation history messages.
//!
//! A message body is an immutable tagged variant: either plain text or a
//! compressed form paired with the dictionary that reverses it. Compression
//! only ever changes the stored representation; `logical_content` always
//! yields the original text.

use serde::{Deserialize, Serialize};

use crate::compression::{CompressionDictionary, decompress, estimate_tokens};

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion endpoints
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Stored form of a message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageBody {
    /// Original text as produced.
    Plain { text: String },
    /// Dictionary-substituted text plus the mapping that restores it.
    Compressed {
        text: String,
        dict: CompressionDictionary,
    },
}

/// One entry in the run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub body: MessageBody,
    /// Action whose result this message carries, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_action: Option<String>,
    /// True for synthetic messages produced by context summarization.
    #[serde(default)]
    pub summary: bool,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Create a user message carrying a tool result.
    pub fn tool_result(action: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source_action: Some(action.into()),
            ..Self::plain(Role::User, content)
        }
    }

    /// Create the synthetic message that replaces a summarized range.
    pub fn context_summary(content: impl Into<String>) -> Self {
        Self {
            summary: true,
            ..Self::plain(Role::User, content)
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            body: MessageBody::Plain {
                text: content.into(),
            },
            source_action: None,
            summary: false,
        }
    }

    /// Replace the body with a compressed variant. The caller is responsible
    /// for the dictionary actually reversing the text.
    pub fn into_compressed(self, text: String, dict: CompressionDictionary) -> Self {
        Self {
            body: MessageBody::Compressed { text, dict },
            ..self
        }
    }

    /// Text as stored (compressed form for compressed messages).
    pub fn stored_text(&self) -> &str {
        match &self.body {
            MessageBody::Plain { text } => text,
            MessageBody::Compressed { text, .. } => text,
        }
    }

    /// Original text, decompressing if needed.
    pub fn logical_content(&self) -> String {
        match &self.body {
            MessageBody::Plain { text } => text.clone(),
            MessageBody::Compressed { text, dict } => decompress(text, dict),
        }
    }

    /// True when the stored form is compressed.
    pub fn is_compressed(&self) -> bool {
        matches!(self.body, MessageBody::Compressed { .. })
    }

    /// Estimated token size of the stored representation.
    pub fn size_estimate(&self) -> usize {
        estimate_tokens(self.stored_text())
    }

    /// Decompressed copy with a plain body.
    pub fn to_plain(&self) -> Self {
        Self {
            role: self.role,
            body: MessageBody::Plain {
                text: self.logical_content(),
            },
            source_action: self.source_action.clone(),
            summary: self.summary,
        }
    }
}

/// A plain role/content pair as sent to an LLM endpoint. History messages
/// are materialized into this shape after decompression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a system chat message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user chat message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant chat message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CompressionOptions, compress};

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_plain_message_content() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.stored_text(), "hello");
        assert_eq!(msg.logical_content(), "hello");
        assert!(!msg.is_compressed());
        assert!(!msg.summary);
    }

    #[test]
    fn test_tool_result_message() {
        let msg = Message::tool_result("run_command", "ok");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.source_action.as_deref(), Some("run_command"));
    }

    #[test]
    fn test_context_summary_message() {
        let msg = Message::context_summary("[Context Summary]\nthings happened");
        assert!(msg.summary);
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn test_compressed_message_logical_content() {
        let text = "repeated /var/log/app/server.log line with more context here again "
            .repeat(40);
        let opts = CompressionOptions {
            min_chars: 1,
            min_tokens: 0,
            max_entries: 100,
        };
        let (compressed, dict) = compress(&text, &opts);
        assert!(!dict.is_empty());

        let msg = Message::tool_result("run_command", text.clone()).into_compressed(compressed, dict);
        assert!(msg.is_compressed());
        assert_eq!(msg.logical_content(), text);
        assert!(msg.size_estimate() < estimate_tokens(&text));
        // Source action survives the body swap
        assert_eq!(msg.source_action.as_deref(), Some("run_command"));
    }

    #[test]
    fn test_to_plain_decompresses() {
        let text = "some /etc/config/path.yml referenced twice, some /etc/config/path.yml again, plus filler so patterns pay off nicely "
            .repeat(10);
        let opts = CompressionOptions {
            min_chars: 1,
            min_tokens: 0,
            max_entries: 100,
        };
        let (compressed, dict) = compress(&text, &opts);
        let msg = Message::user(text.clone()).into_compressed(compressed, dict);

        let plain = msg.to_plain();
        assert!(!plain.is_compressed());
        assert_eq!(plain.stored_text(), text);
    }

    #[test]
    fn test_message_serde_roundtrip() {
        let msg = Message::tool_result("read_file", "file contents");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
