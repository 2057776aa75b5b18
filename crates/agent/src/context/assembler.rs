//! Context assembly: turns room history into a bounded prompt.
//!
//! The prompt is a fixed prefix followed by live history:
//!
//! 1. **System**: the configured template with `{name}` and `{timestamp}`
//!    filled in, plus multi-user instructions when enabled
//! 2. **Additional prompts**: configured role-tagged entries, verbatim
//! 3. **History**: newest first from the walker until a budget is hit,
//!    then reversed into chronological order
//!
//! Two budgets apply to the whole context: a word budget (whitespace-split
//! words of every entry, sender prefixes included) and a message budget. An
//! entry that would reach either budget is left out and ends the walk.

use chrono::{Local, NaiveDateTime};
use parley_config::{AppConfig, BackendConfig, PromptEntry};
use parley_core::error::{Error, Result};
use parley_core::message::{ChatMessage, PromptContext, Role, word_count};
use parley_core::room::{RoomClient, RoomEvent, parse_local_id};
use tracing::debug;

use crate::context::walker::{HistoryWalker, WalkMode};

/// Appended to the system prompt when history entries carry sender names.
pub const MULTI_USER_INSTRUCTIONS: &str = "\
User messages are in the context of multiperson chatrooms.
Each message indicates its sender by prefixing the message with the sender's name followed by a colon, for example:
\"username: hello world.\"
In this case, the user called \"username\" sent the message \"hello world.\". You should not follow this convention in your responses.
Your response instead could be \"hello username!\" without including any colons, because you are the only one sending your responses there is no need to prefix them.";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds prompt contexts from room history.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system_prompt: String,
    additional_prompt: Vec<PromptEntry>,
    enable_multi_user: bool,
    reply_in_thread: bool,
}

impl ContextAssembler {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            additional_prompt: config.additional_prompt.clone(),
            enable_multi_user: config.enable_multi_user,
            reply_in_thread: config.reply_in_thread,
        }
    }

    /// Assemble the context answering `trigger` within the budgets of `backend`.
    pub async fn build_context(
        &self,
        room: &dyn RoomClient,
        trigger: &RoomEvent,
        bot_name: &str,
        backend: &BackendConfig,
    ) -> Result<PromptContext> {
        self.build_context_at(room, trigger, bot_name, backend, Local::now().naive_local())
            .await
    }

    pub(crate) async fn build_context_at(
        &self,
        room: &dyn RoomClient,
        trigger: &RoomEvent,
        bot_name: &str,
        backend: &BackendConfig,
        now: NaiveDateTime,
    ) -> Result<PromptContext> {
        let max_messages = backend.max_context_messages;
        if self.additional_prompt.len() > max_messages.saturating_sub(1) {
            return Err(Error::config(format!(
                "too many additional prompts ({}) for a context of {} messages; \
                 the conversation would never be seen",
                self.additional_prompt.len(),
                max_messages
            )));
        }

        let prefix = self.prefix(bot_name, now);
        let mut words: usize = prefix.iter().map(ChatMessage::word_count).sum();
        let mut messages = prefix.len() - 1;

        let mode = if self.reply_in_thread {
            WalkMode::ReplyChain
        } else {
            WalkMode::Linear
        };
        let mut walker = HistoryWalker::new(room, trigger, mode, max_messages);
        let mut history: Vec<ChatMessage> = Vec::new();

        while let Some(event) = walker.next().await? {
            let Some(body) = event.text_body() else {
                continue;
            };

            let text = if self.enable_multi_user {
                let sender = match room.display_name(&event.sender).await {
                    Some(name) if !name.trim().is_empty() => name,
                    _ => parse_local_id(&event.sender).to_string(),
                };
                format!("{sender}: {body}")
            } else {
                body.to_string()
            };

            words += word_count(&text);
            messages += 1;
            if words >= backend.max_words || messages >= max_messages {
                debug!(room = %trigger.room_id, words, messages, "Context budget reached");
                break;
            }

            let role = if event.sender == room.user_id() {
                Role::Assistant
            } else {
                Role::User
            };
            history.push(ChatMessage::new(role, Some(event.sender.clone()), text).at(event.timestamp));
        }

        history.reverse();
        debug!(
            room = %trigger.room_id,
            prefix = prefix.len(),
            history = history.len(),
            "Assembled context"
        );
        Ok(PromptContext::new(prefix, history))
    }

    fn prefix(&self, bot_name: &str, now: NaiveDateTime) -> Vec<ChatMessage> {
        let mut system = self
            .system_prompt
            .replace("{name}", bot_name)
            .replace("{timestamp}", &now.format(TIMESTAMP_FORMAT).to_string());
        if self.enable_multi_user {
            system.push('\n');
            system.push_str(MULTI_USER_INSTRUCTIONS);
        }

        std::iter::once(ChatMessage::system(system))
            .chain(
                self.additional_prompt
                    .iter()
                    .map(|p| ChatMessage::new(p.role, None, p.content.clone())),
            )
            .collect()
    }
}
