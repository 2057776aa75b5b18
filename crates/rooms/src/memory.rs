//! In-memory room runtime.
//!
//! `MemoryRoom` keeps timelines, membership and display names in process and
//! records everything the assistant does (typing, replies, reactions, read
//! receipts). It backs the console chat and every pipeline test.
//!
//! Encrypted events are stored as [`EventContent::Encrypted`] in the timeline;
//! `get_event` hands out the plaintext unless the event was registered as
//! undecryptable.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parley_core::error::RoomError;
use parley_core::room::{
    EventContent, HistoryCursor, HistoryPage, MessageContent, MessageType, Relation,
    RelationKind, RoomClient, RoomEvent,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Something the bot sent into a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Reply(SentReply),
    Reaction(Reaction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub room_id: String,
    pub event_id: String,
    pub in_reply_to: String,
    pub text: String,
    pub in_thread: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub room_id: String,
    pub event_id: String,
    pub key: String,
}

/// Builder for message events.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    room_id: String,
    sender: String,
    body: String,
    msgtype: MessageType,
    relation: Relation,
    event_id: Option<String>,
}

impl MessageBuilder {
    /// A plain text message.
    pub fn text(room_id: impl Into<String>, sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            sender: sender.into(),
            body: body.into(),
            msgtype: MessageType::Text,
            relation: Relation::default(),
            event_id: None,
        }
    }

    pub fn msgtype(mut self, msgtype: MessageType) -> Self {
        self.msgtype = msgtype;
        self
    }

    pub fn reply_to(mut self, event_id: impl Into<String>) -> Self {
        self.relation.in_reply_to = Some(event_id.into());
        self
    }

    pub fn in_thread(mut self, root: impl Into<String>) -> Self {
        self.relation.kind = Some(RelationKind::Thread { root: root.into() });
        self
    }

    pub fn edit_of(mut self, target: impl Into<String>) -> Self {
        self.relation.kind = Some(RelationKind::Replace {
            target: target.into(),
        });
        self
    }

    /// Use a fixed event id instead of a generated one.
    pub fn id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

#[derive(Default)]
struct Timeline {
    members: Vec<String>,
    events: Vec<RoomEvent>,
}

#[derive(Default)]
struct RoomState {
    rooms: HashMap<String, Timeline>,
    display_names: HashMap<String, String>,
    /// Plaintext of encrypted events, keyed by event id
    plaintext: HashMap<String, RoomEvent>,
    unreachable: HashSet<String>,
    next_id: u64,
    typing: Vec<(String, bool)>,
    replies: Vec<SentReply>,
    reactions: Vec<Reaction>,
    read_receipts: Vec<(String, String)>,
}

/// An in-process chat runtime.
pub struct MemoryRoom {
    user_id: String,
    epoch: DateTime<Utc>,
    state: Mutex<RoomState>,
    outbox: Option<mpsc::UnboundedSender<Outgoing>>,
}

impl MemoryRoom {
    /// Create a runtime where the bot is `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            epoch: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().unwrap_or_default(),
            state: Mutex::new(RoomState::default()),
            outbox: None,
        }
    }

    /// Forward replies and reactions to `tx` as they are sent.
    pub fn with_outbox(mut self, tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        self.outbox = Some(tx);
        self
    }

    fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a room with the given members (the bot is added automatically).
    pub fn create_room(&self, room_id: &str, members: &[&str]) {
        let mut state = self.state();
        let timeline = state.rooms.entry(room_id.to_string()).or_default();
        for member in std::iter::once(self.user_id.as_str()).chain(members.iter().copied()) {
            if !timeline.members.iter().any(|m| m == member) {
                timeline.members.push(member.to_string());
            }
        }
    }

    pub fn set_display_name(&self, user_id: &str, name: &str) {
        self.state()
            .display_names
            .insert(user_id.to_string(), name.to_string());
    }

    /// Append a message to its room's timeline.
    pub fn post(&self, message: MessageBuilder) -> RoomEvent {
        let mut state = self.state();
        let event = self.make_event(&mut state, message);
        Self::append(&mut state, event.clone());
        event
    }

    /// Append an encrypted message; `get_event` decrypts it.
    pub fn post_encrypted(&self, message: MessageBuilder) -> RoomEvent {
        let mut state = self.state();
        let event = self.make_event(&mut state, message);
        state.plaintext.insert(event.event_id.clone(), event.clone());
        let ciphertext = RoomEvent {
            content: EventContent::Encrypted,
            ..event.clone()
        };
        Self::append(&mut state, ciphertext);
        event
    }

    /// Append an encrypted event nobody holds the keys for.
    pub fn post_undecryptable(&self, room_id: &str, sender: &str) -> RoomEvent {
        let mut state = self.state();
        let event = RoomEvent {
            event_id: Self::next_event_id(&mut state),
            room_id: room_id.to_string(),
            sender: sender.to_string(),
            timestamp: self.next_timestamp(&state),
            content: EventContent::Encrypted,
        };
        Self::append(&mut state, event.clone());
        event
    }

    /// Append a non-message event (membership, reaction, ...).
    pub fn post_other(&self, room_id: &str, sender: &str, event_type: &str) -> RoomEvent {
        let mut state = self.state();
        let event = RoomEvent {
            event_id: Self::next_event_id(&mut state),
            room_id: room_id.to_string(),
            sender: sender.to_string(),
            timestamp: self.next_timestamp(&state),
            content: EventContent::Other {
                event_type: event_type.to_string(),
            },
        };
        Self::append(&mut state, event.clone());
        event
    }

    /// Make lookups of `event_id` fail with a transport error.
    pub fn make_unreachable(&self, event_id: &str) {
        self.state().unreachable.insert(event_id.to_string());
    }

    pub fn events(&self, room_id: &str) -> Vec<RoomEvent> {
        self.state()
            .rooms
            .get(room_id)
            .map(|t| t.events.clone())
            .unwrap_or_default()
    }

    pub fn replies(&self) -> Vec<SentReply> {
        self.state().replies.clone()
    }

    pub fn reactions(&self) -> Vec<Reaction> {
        self.state().reactions.clone()
    }

    /// Typing changes in order, as `(room_id, typing)`.
    pub fn typing_log(&self) -> Vec<(String, bool)> {
        self.state().typing.clone()
    }

    pub fn read_receipts(&self) -> Vec<(String, String)> {
        self.state().read_receipts.clone()
    }

    fn make_event(&self, state: &mut RoomState, message: MessageBuilder) -> RoomEvent {
        let event_id = match message.event_id {
            Some(id) => id,
            None => Self::next_event_id(state),
        };
        RoomEvent {
            event_id,
            room_id: message.room_id,
            sender: message.sender,
            timestamp: self.next_timestamp(state),
            content: EventContent::Message(MessageContent {
                msgtype: message.msgtype,
                body: message.body,
                relation: message.relation,
            }),
        }
    }

    fn next_event_id(state: &mut RoomState) -> String {
        state.next_id += 1;
        format!("$ev{}", state.next_id)
    }

    fn next_timestamp(&self, state: &RoomState) -> DateTime<Utc> {
        let count: usize = state.rooms.values().map(|t| t.events.len()).sum();
        self.epoch + Duration::seconds(count as i64)
    }

    fn append(state: &mut RoomState, event: RoomEvent) {
        state
            .rooms
            .entry(event.room_id.clone())
            .or_default()
            .events
            .push(event);
    }

    fn emit(&self, outgoing: Outgoing) {
        if let Some(tx) = &self.outbox {
            // A closed outbox only means nobody is watching
            let _ = tx.send(outgoing);
        }
    }
}

#[async_trait]
impl RoomClient for MemoryRoom {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn joined_member_count(&self, room_id: &str) -> Result<usize, RoomError> {
        self.state()
            .rooms
            .get(room_id)
            .map(|t| t.members.len())
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))
    }

    async fn get_event(&self, room_id: &str, event_id: &str) -> Result<RoomEvent, RoomError> {
        let state = self.state();
        if state.unreachable.contains(event_id) {
            return Err(RoomError::Transport(format!("event {event_id} is unreachable")));
        }
        if let Some(plain) = state.plaintext.get(event_id) {
            return Ok(plain.clone());
        }
        state
            .rooms
            .get(room_id)
            .and_then(|t| t.events.iter().find(|e| e.event_id == event_id))
            .cloned()
            .ok_or_else(|| RoomError::EventNotFound {
                room_id: room_id.to_string(),
                event_id: event_id.to_string(),
            })
    }

    async fn history_before(
        &self,
        room_id: &str,
        from: &HistoryCursor,
        limit: usize,
    ) -> Result<HistoryPage, RoomError> {
        let state = self.state();
        let timeline = state
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;

        let end = match from {
            HistoryCursor::Before(event_id) => timeline
                .events
                .iter()
                .position(|e| &e.event_id == event_id)
                .ok_or_else(|| RoomError::EventNotFound {
                    room_id: room_id.to_string(),
                    event_id: event_id.clone(),
                })?,
            HistoryCursor::Token(token) => token
                .parse::<usize>()
                .map_err(|_| RoomError::Transport(format!("invalid history token '{token}'")))?
                .min(timeline.events.len()),
        };
        let start = end.saturating_sub(limit);

        let events = timeline.events[start..end].iter().rev().cloned().collect();
        let next = (start > 0).then(|| start.to_string());
        Ok(HistoryPage { events, next })
    }

    async fn display_name(&self, user_id: &str) -> Option<String> {
        self.state().display_names.get(user_id).cloned()
    }

    async fn set_typing(&self, room_id: &str, typing: bool) -> Result<(), RoomError> {
        self.state().typing.push((room_id.to_string(), typing));
        Ok(())
    }

    async fn send_reply(
        &self,
        to: &RoomEvent,
        text: &str,
        in_thread: bool,
    ) -> Result<String, RoomError> {
        let mut message = MessageBuilder::text(&to.room_id, &self.user_id, text)
            .msgtype(MessageType::Notice)
            .reply_to(&to.event_id);
        if in_thread {
            let root = to.thread_root().unwrap_or(&to.event_id).to_string();
            message = message.in_thread(root);
        }

        let reply = {
            let mut state = self.state();
            if !state.rooms.contains_key(&to.room_id) {
                return Err(RoomError::DeliveryFailed {
                    room_id: to.room_id.clone(),
                    reason: "not joined".into(),
                });
            }
            let event = self.make_event(&mut state, message);
            let reply = SentReply {
                room_id: to.room_id.clone(),
                event_id: event.event_id.clone(),
                in_reply_to: to.event_id.clone(),
                text: text.to_string(),
                in_thread,
            };
            Self::append(&mut state, event);
            state.replies.push(reply.clone());
            reply
        };

        debug!(room = %reply.room_id, event = %reply.event_id, "Reply sent");
        let event_id = reply.event_id.clone();
        self.emit(Outgoing::Reply(reply));
        Ok(event_id)
    }

    async fn react(&self, room_id: &str, event_id: &str, key: &str) -> Result<(), RoomError> {
        let reaction = Reaction {
            room_id: room_id.to_string(),
            event_id: event_id.to_string(),
            key: key.to_string(),
        };
        self.state().reactions.push(reaction.clone());
        self.emit(Outgoing::Reaction(reaction));
        Ok(())
    }

    async fn mark_read(&self, room_id: &str, event_id: &str) -> Result<(), RoomError> {
        self.state()
            .read_receipts
            .push((room_id.to_string(), event_id.to_string()));
        Ok(())
    }
}
