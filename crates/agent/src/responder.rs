//! Responder policy: decides whether an incoming message gets an answer.
//!
//! Rules, in order, each short-circuiting:
//!
//! 1. Own messages are ignored
//! 2. Administrative commands (`!...`) are left to the admin surface
//! 3. Senders outside the allowlist are ignored
//! 4. Only plain text messages count; edits are ignored
//! 5. Messages mentioning the bot by name are answered
//! 6. Everything in a two-person room is answered
//! 7. In threading mode, a threaded message is judged by its thread root
//! 8. Replies to the bot's own messages are answered
//!
//! Rule 7 walks to the root in an explicit, bounded loop. Any failure to
//! fetch a parent event means "do not respond".

use parley_core::room::{RoomClient, RoomEvent, parse_local_id};
use parley_security::SenderAllowlist;
use regex_lite::Regex;
use tracing::{debug, warn};

/// Prefix of administrative commands.
pub const COMMAND_PREFIX: char = '!';

/// What one evaluation step concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Respond,
    Ignore,
    /// Judge the thread root instead
    FollowRoot(String),
}

/// Decides which messages the bot answers.
#[derive(Debug, Clone)]
pub struct ResponderPolicy {
    bot_id: String,
    /// `None` only if the name could not be compiled into a pattern
    mention: Option<Regex>,
    allowlist: SenderAllowlist,
    reply_in_thread: bool,
    max_hops: usize,
}

impl ResponderPolicy {
    pub fn new(
        bot_id: impl Into<String>,
        bot_name: &str,
        allowlist: SenderAllowlist,
        reply_in_thread: bool,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            mention: mention_pattern(bot_name),
            allowlist,
            reply_in_thread,
            max_hops: 20,
        }
    }

    /// Bound the number of thread roots followed for one message.
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Whether `text` mentions the bot as a whole token.
    pub fn mentions_bot(&self, text: &str) -> bool {
        self.mention.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Decide whether `event` deserves a response.
    pub async fn should_respond(&self, room: &dyn RoomClient, event: &RoomEvent) -> bool {
        let mut current = event.clone();
        for _ in 0..=self.max_hops {
            match self.evaluate(room, &current).await {
                Verdict::Respond => return true,
                Verdict::Ignore => return false,
                Verdict::FollowRoot(root) => match room.get_event(&current.room_id, &root).await {
                    Ok(parent) => current = parent,
                    Err(e) => {
                        warn!(room = %current.room_id, event = %root, error = %e, "Failed to fetch thread root");
                        return false;
                    }
                },
            }
        }
        debug!(room = %event.room_id, "Thread walk exceeded its bound");
        false
    }

    async fn evaluate(&self, room: &dyn RoomClient, event: &RoomEvent) -> Verdict {
        if event.sender == self.bot_id {
            return Verdict::Ignore;
        }

        let Some(message) = event.message() else {
            return Verdict::Ignore;
        };
        if message.body.starts_with(COMMAND_PREFIX) {
            return Verdict::Ignore;
        }

        if !self.allowlist.is_allowed(&event.sender) {
            return Verdict::Ignore;
        }

        if !event.is_plain_text() || event.is_edit() {
            return Verdict::Ignore;
        }

        if self.mentions_bot(&message.body) {
            return Verdict::Respond;
        }

        match room.joined_member_count(&event.room_id).await {
            Ok(2) => return Verdict::Respond,
            Ok(_) => {}
            Err(e) => debug!(room = %event.room_id, error = %e, "Member count unavailable"),
        }

        if self.reply_in_thread {
            if let Some(root) = event.thread_root() {
                if root != event.event_id {
                    return Verdict::FollowRoot(root.to_string());
                }
            }
        }

        if let Some(parent_id) = event.reply_to() {
            return match room.get_event(&event.room_id, parent_id).await {
                Ok(parent) if parent.sender == self.bot_id => Verdict::Respond,
                Ok(_) => Verdict::Ignore,
                Err(e) => {
                    warn!(room = %event.room_id, event = %parent_id, error = %e, "Failed to fetch replied-to event");
                    Verdict::Ignore
                }
            };
        }

        Verdict::Ignore
    }
}

/// `(^|\s)@?NAME([ :,.!?]|$)`, case-insensitive.
fn mention_pattern(bot_name: &str) -> Option<Regex> {
    let pattern = format!(r"(?i)(^|\s)@?{}([ :,.!?]|$)", regex_lite::escape(bot_name));
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(name = bot_name, error = %e, "Bot name cannot be matched; mentions disabled");
            None
        }
    }
}

/// The name the bot answers to: configured name, else its display name,
/// else the local part of its user id.
pub async fn resolve_bot_name(configured: Option<&str>, room: &dyn RoomClient) -> String {
    if let Some(name) = configured.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    let bot_id = room.user_id();
    match room.display_name(bot_id).await {
        Some(name) if !name.trim().is_empty() => name,
        _ => parse_local_id(bot_id).to_string(),
    }
}
