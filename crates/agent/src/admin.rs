//! `!ai` administrative commands.
//!
//! Lets allowed users inspect and change the active backend and model from
//! inside a room. Mutating commands acknowledge with a ✅ reaction; anything
//! else gets a text reply.

use std::sync::Arc;

use parley_core::error::{Error, Result};
use parley_core::room::{RoomClient, RoomEvent};
use parley_providers::{DispatchRouter, SwitchOutcome};
use tracing::{debug, info};

/// Prefix that routes a message to the admin surface.
pub const ADMIN_PREFIX: &str = "!ai";

/// Reaction key acknowledging a successful mutation.
pub const ACK: &str = "✅";

const USAGE: &str = "\
usage:
- `!ai info`
- `!ai platform list` / `!ai platform current` / `!ai platform switch <name> [model]`
- `!ai switch <name> [model]`
- `!ai model list` / `!ai model current` / `!ai model use <name>`
- `!ai use <name>`";

/// A parsed `!ai` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Info,
    PlatformList,
    PlatformCurrent,
    ModelList,
    ModelCurrent,
    UseModel(String),
    SwitchPlatform {
        selector: String,
        model: Option<String>,
    },
    /// Unrecognised or incomplete command
    Help,
}

impl AdminCommand {
    /// Parse a message body. `None` when the body is not an `!ai` command.
    pub fn parse(body: &str) -> Option<Self> {
        let mut words = body.split_whitespace();
        if words.next()? != ADMIN_PREFIX {
            return None;
        }
        let args: Vec<&str> = words.collect();

        let command = match args.as_slice() {
            ["info"] => Self::Info,
            ["platform", "list"] => Self::PlatformList,
            ["platform", "current"] => Self::PlatformCurrent,
            ["platform", "switch", name] | ["switch", name] => Self::SwitchPlatform {
                selector: (*name).to_string(),
                model: None,
            },
            ["platform", "switch", name, model] | ["switch", name, model] => {
                Self::SwitchPlatform {
                    selector: (*name).to_string(),
                    model: Some((*model).to_string()),
                }
            }
            ["model", "list"] => Self::ModelList,
            ["model", "current"] => Self::ModelCurrent,
            ["model", "use", name] | ["use", name] => Self::UseModel((*name).to_string()),
            _ => Self::Help,
        };
        Some(command)
    }
}

/// What a command did in the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminResponse {
    Reply(String),
    Acknowledged,
}

/// Executes admin commands against the dispatch router.
pub struct AdminCommands {
    router: Arc<DispatchRouter>,
    bot_name: String,
}

impl AdminCommands {
    pub fn new(router: Arc<DispatchRouter>, bot_name: impl Into<String>) -> Self {
        Self {
            router,
            bot_name: bot_name.into(),
        }
    }

    /// Run `command` and compute the answer, without touching the room.
    pub async fn execute(&self, command: &AdminCommand) -> Result<AdminResponse> {
        debug!(?command, "Executing admin command");
        let response = match command {
            AdminCommand::Info => AdminResponse::Reply(self.info()?),
            AdminCommand::PlatformList => AdminResponse::Reply(
                self.router
                    .platforms()
                    .iter()
                    .map(|p| format!("- {p}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            AdminCommand::PlatformCurrent => AdminResponse::Reply(format!(
                "current use platform is {}",
                self.router.current().selector
            )),
            AdminCommand::ModelList => {
                let models = self.router.list_models().await;
                if models.is_empty() {
                    AdminResponse::Reply("no models available".into())
                } else {
                    AdminResponse::Reply(
                        models
                            .iter()
                            .map(|m| format!("- {m}"))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    )
                }
            }
            AdminCommand::ModelCurrent => AdminResponse::Reply(format!(
                "current use model is {}",
                self.router.current().model
            )),
            AdminCommand::UseModel(model) => match self.router.switch_model(model).await {
                Ok(()) => AdminResponse::Acknowledged,
                Err(e) => AdminResponse::Reply(e.to_string()),
            },
            AdminCommand::SwitchPlatform { selector, model } => match self
                .router
                .switch_backend(selector, model.as_deref())
                .await
            {
                Ok(SwitchOutcome::Switched { selector, model }) => {
                    info!(platform = %selector, model = %model, "Platform switched by command");
                    AdminResponse::Acknowledged
                }
                Ok(SwitchOutcome::NeedsSubKind(help)) => AdminResponse::Reply(help),
                Ok(SwitchOutcome::AlreadyActive(selector)) => {
                    AdminResponse::Reply(format!("current ai platform is already {selector}"))
                }
                Err(Error::Selection(message)) => AdminResponse::Reply(message),
                Err(_) => AdminResponse::Reply(format!("not found ai platform: {selector}")),
            },
            AdminCommand::Help => AdminResponse::Reply(USAGE.into()),
        };
        Ok(response)
    }

    /// Run the command carried by `event` and answer in the room.
    pub async fn handle(
        &self,
        room: &dyn RoomClient,
        event: &RoomEvent,
        command: &AdminCommand,
    ) -> Result<()> {
        match self.execute(command).await? {
            AdminResponse::Acknowledged => {
                room.react(&event.room_id, &event.event_id, ACK).await?;
            }
            AdminResponse::Reply(text) => {
                room.send_reply(event, &text, false).await?;
            }
        }
        Ok(())
    }

    fn info(&self) -> Result<String> {
        let active = self.router.resolve_active_backend()?;
        let mut lines = vec![
            format!("bot name: {}", self.bot_name),
            format!("platform: {}", active.selection.selector),
            "platform detail:".to_string(),
        ];
        lines.extend(
            active
                .config
                .describe()
                .into_iter()
                .map(|(key, value)| format!("- {key}: {value}")),
        );
        lines.push(format!("model: {}", active.selection.model));
        Ok(lines.join("\n"))
    }
}
