//! The assistant pipeline: the heart of Parley.
//!
//! Every inbound room event goes through the same steps:
//!
//! 1. **Route** `!ai` administrative commands to the admin surface
//! 2. **Decide** whether the message deserves an answer (mention, direct
//!    room, thread root, reply to the bot)
//! 3. **Build context** from the system prompt, additional prompts and a
//!    budgeted walk back through room history
//! 4. **Send to the LLM** via the active backend
//! 5. **Reply** in the room, or explain what went wrong

pub mod admin;
pub mod context;
pub mod pipeline;
pub mod responder;

#[cfg(test)]
pub(crate) mod test_support;

pub use admin::{ACK, ADMIN_PREFIX, AdminCommand, AdminCommands, AdminResponse};
pub use context::{ContextAssembler, HistoryWalker, MULTI_USER_INSTRUCTIONS, WalkMode};
pub use pipeline::{Outcome, Pipeline};
pub use responder::{COMMAND_PREFIX, ResponderPolicy, resolve_bot_name};
