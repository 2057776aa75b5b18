//! Chat message and prompt context domain types.
//!
//! These are the value objects that flow through the assistant:
//! room event → [`ChatMessage`] → [`PromptContext`] → backend request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message author in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, rules)
    System,
    /// A room member other than the bot
    User,
    /// The bot itself
    Assistant,
}

impl Role {
    /// Wire name used by every supported backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a role name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of a prompt. Immutable once built from a room event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who the model should consider the author
    pub role: Role,

    /// Room identity of the author (`None` for configured prompts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// The text content, possibly prefixed with the sender name
    pub text: String,

    /// When the underlying event was sent
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a new message.
    pub fn new(role: Role, sender: Option<String>, text: impl Into<String>) -> Self {
        Self {
            role,
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, None, text)
    }

    /// Create a user message from a room member.
    pub fn user(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Role::User, Some(sender.into()), text)
    }

    /// Create an assistant message authored by the bot.
    pub fn assistant(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(sender.into()), text)
    }

    /// Override the timestamp (used when building from historical events).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whitespace-separated word count of the text.
    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The ordered prompt sent to a backend for one completion call.
///
/// The first `prefix_len` entries are the fixed system/additional prompts
/// from configuration; the rest are chronological room turns, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    messages: Vec<ChatMessage>,
    prefix_len: usize,
}

impl PromptContext {
    /// Combine a fixed prefix with chronological history.
    pub fn new(prefix: Vec<ChatMessage>, history: Vec<ChatMessage>) -> Self {
        let prefix_len = prefix.len();
        let mut messages = prefix;
        messages.extend(history);
        Self {
            messages,
            prefix_len,
        }
    }

    /// Every entry, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The configured prefix (system prompt + additional prompts).
    pub fn prefix(&self) -> &[ChatMessage] {
        &self.messages[..self.split()]
    }

    /// The room turns following the prefix.
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages[self.split()..]
    }

    // A deserialized context may carry a prefix length past the end.
    fn split(&self) -> usize {
        self.prefix_len.min(self.messages.len())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total word count across every entry.
    pub fn word_count(&self) -> usize {
        self.messages.iter().map(ChatMessage::word_count).sum()
    }

    /// The most recent entry (normally the triggering message).
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
