//! Lazy newest-to-oldest traversal of a conversation.
//!
//! Two modes:
//! - **Reply chain**: the trigger, then whatever it replies to, and so on.
//!   Bounded by a hop limit and a visited set.
//! - **Linear**: the trigger, then the room timeline before it, paged
//!   backward for at most [`MAX_PAGES`] pages. Encrypted events are fetched
//!   again for decryption; one that still cannot be read aborts the walk.
//!
//! The walker only fetches when asked for the next event, so the assembler's
//! budget decides how much history is ever requested.

use std::collections::{HashSet, VecDeque};

use parley_core::error::{Error, Result};
use parley_core::room::{HistoryCursor, RoomClient, RoomEvent};
use tracing::debug;

/// History pages a linear walk fetches before giving up. Rooms full of
/// reactions or state events would otherwise be paged to their start.
pub const MAX_PAGES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    ReplyChain,
    Linear,
}

enum WalkState {
    Start(RoomEvent),
    Chain { parent: Option<String> },
    Paging { cursor: Option<HistoryCursor> },
    Done,
}

pub struct HistoryWalker<'a> {
    room: &'a dyn RoomClient,
    room_id: String,
    mode: WalkMode,
    state: WalkState,
    max_hops: usize,
    hops: usize,
    visited: HashSet<String>,
    page_size: usize,
    pages: usize,
    buffered: VecDeque<RoomEvent>,
}

impl<'a> HistoryWalker<'a> {
    /// Walk from `trigger`; `max_context_messages` sets the hop bound and
    /// the page size (twice the bound).
    pub fn new(
        room: &'a dyn RoomClient,
        trigger: &RoomEvent,
        mode: WalkMode,
        max_context_messages: usize,
    ) -> Self {
        Self {
            room,
            room_id: trigger.room_id.clone(),
            mode,
            state: WalkState::Start(trigger.clone()),
            max_hops: max_context_messages,
            hops: 0,
            visited: HashSet::from([trigger.event_id.clone()]),
            page_size: (max_context_messages * 2).max(1),
            pages: 0,
            buffered: VecDeque::new(),
        }
    }

    /// The next older event, or `None` when the walk is over.
    pub async fn next(&mut self) -> Result<Option<RoomEvent>> {
        loop {
            match std::mem::replace(&mut self.state, WalkState::Done) {
                WalkState::Start(trigger) => {
                    self.state = match self.mode {
                        WalkMode::ReplyChain => WalkState::Chain {
                            parent: trigger.reply_to().map(String::from),
                        },
                        WalkMode::Linear => WalkState::Paging {
                            cursor: Some(HistoryCursor::Before(trigger.event_id.clone())),
                        },
                    };
                    return Ok(Some(trigger));
                }

                WalkState::Chain { parent: None } | WalkState::Done => return Ok(None),

                WalkState::Chain {
                    parent: Some(parent_id),
                } => {
                    if self.hops >= self.max_hops || !self.visited.insert(parent_id.clone()) {
                        debug!(room = %self.room_id, event = %parent_id, "Reply chain walk stopped");
                        return Ok(None);
                    }
                    self.hops += 1;

                    let parent = self.room.get_event(&self.room_id, &parent_id).await?;
                    if parent.is_encrypted() {
                        return Err(Error::Decryption { event_id: parent_id });
                    }
                    self.state = WalkState::Chain {
                        parent: parent.reply_to().map(String::from),
                    };
                    return Ok(Some(parent));
                }

                WalkState::Paging { cursor } => {
                    if let Some(event) = self.buffered.pop_front() {
                        self.state = WalkState::Paging { cursor };
                        return self.decrypt(event).await.map(Some);
                    }

                    let Some(cursor) = cursor else {
                        return Ok(None);
                    };
                    if self.pages >= MAX_PAGES {
                        debug!(room = %self.room_id, pages = self.pages, "History page limit reached");
                        return Ok(None);
                    }
                    self.pages += 1;
                    let page = self
                        .room
                        .history_before(&self.room_id, &cursor, self.page_size)
                        .await?;
                    debug!(room = %self.room_id, events = page.events.len(), "Fetched history page");

                    if page.events.is_empty() && page.next.is_none() {
                        return Ok(None);
                    }
                    self.buffered.extend(page.events);
                    self.state = WalkState::Paging {
                        cursor: page.next.map(HistoryCursor::Token),
                    };
                }
            }
        }
    }

    async fn decrypt(&self, event: RoomEvent) -> Result<RoomEvent> {
        if !event.is_encrypted() {
            return Ok(event);
        }
        match self.room.get_event(&event.room_id, &event.event_id).await {
            Ok(decrypted) if !decrypted.is_encrypted() => Ok(decrypted),
            _ => Err(Error::Decryption {
                event_id: event.event_id,
            }),
        }
    }
}
