//! The message pipeline: one inbound event in, at most one reply out.
//!
//! For each event:
//!
//! 1. **Route** `!ai` commands from allowed senders to [`AdminCommands`]
//! 2. **Decide** with the [`ResponderPolicy`] whether to answer at all
//! 3. **Assemble** the prompt from room history for the active backend
//! 4. **Dispatch** to the backend through the [`DispatchRouter`]
//! 5. **Reply** in the room, threaded when configured
//!
//! Failures after step 2 are reported back to the room as
//! `Something went wrong: <reason>`. The typing indicator is cleared on
//! every exit path.

use std::sync::Arc;

use chrono::Utc;
use parley_config::AppConfig;
use parley_core::error::{Error, Result};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::room::{RoomClient, RoomEvent};
use parley_providers::DispatchRouter;
use parley_security::SenderAllowlist;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::admin::{AdminCommand, AdminCommands};
use crate::context::ContextAssembler;
use crate::responder::{ResponderPolicy, resolve_bot_name};

/// What the pipeline did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The event did not qualify for a response
    Ignored,
    /// The event was an administrative command
    Command,
    /// A completion was delivered
    Replied {
        event_id: String,
        backend: String,
        model: String,
    },
    /// An error reply was delivered (or attempted)
    Failed { reason: String },
}

struct Delivered {
    event_id: String,
    backend: String,
    model: String,
    context_messages: usize,
    finish_reason: String,
}

/// Answers room events.
pub struct Pipeline {
    room: Arc<dyn RoomClient>,
    router: Arc<DispatchRouter>,
    policy: ResponderPolicy,
    assembler: ContextAssembler,
    admin: AdminCommands,
    allowlist: SenderAllowlist,
    bot_name: String,
    reply_in_thread: bool,
    events: Arc<EventBus>,
}

impl Pipeline {
    /// Wire a pipeline for `room`. Resolves the bot's name and compiles the
    /// sender allowlist.
    pub async fn new(
        config: &AppConfig,
        room: Arc<dyn RoomClient>,
        router: Arc<DispatchRouter>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let allowlist =
            SenderAllowlist::new(&config.allowed_users).map_err(|e| Error::config(e.to_string()))?;
        let bot_name = resolve_bot_name(config.name.as_deref(), room.as_ref()).await;
        info!(bot = %room.user_id(), name = %bot_name, "Pipeline ready");

        Ok(Self {
            policy: ResponderPolicy::new(
                room.user_id(),
                &bot_name,
                allowlist.clone(),
                config.reply_in_thread,
            ),
            assembler: ContextAssembler::new(config),
            admin: AdminCommands::new(router.clone(), bot_name.clone()),
            allowlist,
            bot_name,
            reply_in_thread: config.reply_in_thread,
            room,
            router,
            events,
        })
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn router(&self) -> &Arc<DispatchRouter> {
        &self.router
    }

    /// Handle `event` on its own task.
    pub fn spawn(self: &Arc<Self>, event: RoomEvent) -> JoinHandle<Outcome> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.handle(&event).await })
    }

    /// Handle one event to completion.
    pub async fn handle(&self, event: &RoomEvent) -> Outcome {
        let room = self.room.as_ref();

        if event.sender != room.user_id() && self.allowlist.is_allowed(&event.sender) {
            if let Some(command) = event.text_body().and_then(AdminCommand::parse) {
                return self.run_command(event, &command).await;
            }
        }

        if !self.policy.should_respond(room, event).await {
            debug!(room = %event.room_id, event = %event.event_id, "Not responding");
            return Outcome::Ignored;
        }

        self.events.publish(DomainEvent::MessageReceived {
            room_id: event.room_id.clone(),
            event_id: event.event_id.clone(),
            sender: event.sender.clone(),
            timestamp: Utc::now(),
        });

        if let Err(e) = room.mark_read(&event.room_id, &event.event_id).await {
            debug!(room = %event.room_id, error = %e, "Read receipt failed");
        }
        if let Err(e) = room.set_typing(&event.room_id, true).await {
            warn!(room = %event.room_id, error = %e, "Failed to start typing");
        }

        let result = self.respond(event).await;

        if let Err(e) = room.set_typing(&event.room_id, false).await {
            warn!(room = %event.room_id, error = %e, "Failed to stop typing");
        }

        match result {
            Ok(delivered) => {
                info!(
                    room = %event.room_id,
                    backend = %delivered.backend,
                    model = %delivered.model,
                    context_messages = delivered.context_messages,
                    "Response sent"
                );
                self.events.publish(DomainEvent::ResponseSent {
                    room_id: event.room_id.clone(),
                    backend: delivered.backend.clone(),
                    model: delivered.model.clone(),
                    context_messages: delivered.context_messages,
                    finish_reason: delivered.finish_reason,
                    timestamp: Utc::now(),
                });
                Outcome::Replied {
                    event_id: delivered.event_id,
                    backend: delivered.backend,
                    model: delivered.model,
                }
            }
            Err(e) => self.fail(event, e).await,
        }
    }

    async fn respond(&self, event: &RoomEvent) -> Result<Delivered> {
        let room = self.room.as_ref();
        let resolved = self.router.resolve_active_backend()?;
        let context = self
            .assembler
            .build_context(room, event, &self.bot_name, &resolved.config)
            .await?;
        let context_messages = context.len();

        let completion = self.router.dispatch(&resolved, context).await?;
        let event_id = room
            .send_reply(event, &completion.text, self.reply_in_thread)
            .await?;

        Ok(Delivered {
            event_id,
            backend: resolved.name().to_string(),
            model: completion.model,
            context_messages,
            finish_reason: completion.finish_reason,
        })
    }

    async fn run_command(&self, event: &RoomEvent, command: &AdminCommand) -> Outcome {
        info!(room = %event.room_id, sender = %event.sender, ?command, "Admin command");
        match self.admin.handle(self.room.as_ref(), event, command).await {
            Ok(()) => Outcome::Command,
            Err(e) => self.fail(event, e).await,
        }
    }

    async fn fail(&self, event: &RoomEvent, e: Error) -> Outcome {
        let reason = e.to_string();
        error!(room = %event.room_id, event = %event.event_id, error = %reason, "Pipeline failed");
        self.events.publish(DomainEvent::PipelineFailed {
            room_id: event.room_id.clone(),
            error_message: reason.clone(),
            timestamp: Utc::now(),
        });

        let text = format!("Something went wrong: {reason}");
        if let Err(e) = self
            .room
            .send_reply(event, &text, self.reply_in_thread)
            .await
        {
            error!(room = %event.room_id, error = %e, "Failed to deliver error reply");
        }
        Outcome::Failed { reason }
    }
}
