//! Room collaborator trait: the abstraction over the hosting chat runtime.
//!
//! Parley never talks to a chat network directly. Everything it needs from
//! the runtime (event lookup with decryption, history paging, membership,
//! display names, typing/reply/reaction primitives) goes through
//! [`RoomClient`], so the assistant logic can run against a real homeserver
//! client or an in-memory room.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RoomError;

/// The `msgtype` of a room message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Notice,
    Emote,
    Image,
    File,
    Other(String),
}

impl MessageType {
    /// Text-like message types (text, notice, emote).
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::Text | Self::Notice | Self::Emote)
    }
}

/// How a message relates to an earlier event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rel_type", rename_all = "snake_case")]
pub enum RelationKind {
    /// Part of a thread rooted at `root`
    Thread { root: String },
    /// Edit/replacement of `target`
    Replace { target: String },
}

/// Relation metadata of a message (`m.relates_to`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RelationKind>,

    /// The event this message directly replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

/// Content of a room message event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub msgtype: MessageType,
    pub body: String,
    #[serde(default)]
    pub relation: Relation,
}

/// The payload of a room event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventContent {
    /// A room message (`m.room.message`)
    Message(MessageContent),
    /// An event that has not been decrypted yet
    Encrypted,
    /// Anything else (state events, reactions, ...)
    Other { event_type: String },
}

/// A single event in a room's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub content: EventContent,
}

impl RoomEvent {
    /// The message content, if this is a message event.
    pub fn message(&self) -> Option<&MessageContent> {
        match &self.content {
            EventContent::Message(m) => Some(m),
            _ => None,
        }
    }

    /// The body of a text-like message.
    pub fn text_body(&self) -> Option<&str> {
        self.message()
            .filter(|m| m.msgtype.is_text_like())
            .map(|m| m.body.as_str())
    }

    /// Whether this is a plain `m.text` message.
    pub fn is_plain_text(&self) -> bool {
        self.message().is_some_and(|m| m.msgtype == MessageType::Text)
    }

    /// Whether this message edits an earlier one.
    pub fn is_edit(&self) -> bool {
        self.message()
            .is_some_and(|m| matches!(m.relation.kind, Some(RelationKind::Replace { .. })))
    }

    /// The thread root, if this message belongs to a thread.
    pub fn thread_root(&self) -> Option<&str> {
        match self.message()?.relation.kind.as_ref()? {
            RelationKind::Thread { root } => Some(root),
            RelationKind::Replace { .. } => None,
        }
    }

    /// The event this message directly replies to.
    pub fn reply_to(&self) -> Option<&str> {
        self.message()?.relation.in_reply_to.as_deref()
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.content, EventContent::Encrypted)
    }
}

/// Where a backward history page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryCursor {
    /// Events strictly before this event
    Before(String),
    /// A continuation token returned by a previous page
    Token(String),
}

/// One page of history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    pub events: Vec<RoomEvent>,
    /// Continuation token; `None` once the start of the room is reached
    pub next: Option<String>,
}

/// The core RoomClient trait.
///
/// Implementations wrap a chat runtime. Each call is a suspension point of
/// the calling pipeline only.
#[async_trait]
pub trait RoomClient: Send + Sync {
    /// The bot's own user identity.
    fn user_id(&self) -> &str;

    /// Number of joined members in a room (bot included).
    async fn joined_member_count(&self, room_id: &str) -> Result<usize, RoomError>;

    /// Fetch one event, decrypting it on demand.
    ///
    /// An event that cannot be decrypted is returned with
    /// [`EventContent::Encrypted`].
    async fn get_event(&self, room_id: &str, event_id: &str) -> Result<RoomEvent, RoomError>;

    /// Page backward through a room's timeline, newest first.
    async fn history_before(
        &self,
        room_id: &str,
        from: &HistoryCursor,
        limit: usize,
    ) -> Result<HistoryPage, RoomError>;

    /// A user's display name, if they set one.
    async fn display_name(&self, user_id: &str) -> Option<String>;

    /// Turn the typing indicator on or off.
    async fn set_typing(&self, room_id: &str, typing: bool) -> Result<(), RoomError>;

    /// Reply to an event, optionally inside its thread. Returns the new event id.
    async fn send_reply(
        &self,
        to: &RoomEvent,
        text: &str,
        in_thread: bool,
    ) -> Result<String, RoomError>;

    /// React to an event with an annotation key (e.g. "✅").
    async fn react(&self, room_id: &str, event_id: &str, key: &str) -> Result<(), RoomError>;

    /// Send a read receipt.
    async fn mark_read(&self, _room_id: &str, _event_id: &str) -> Result<(), RoomError> {
        Ok(()) // No-op default
    }
}

/// Local part of a user identity: `@alice:example.org` → `alice`.
pub fn parse_local_id(user_id: &str) -> &str {
    let trimmed = user_id.strip_prefix('@').unwrap_or(user_id);
    trimmed.split(':').next().unwrap_or(trimmed)
}
