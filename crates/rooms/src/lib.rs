//! Room runtimes for Parley.
//!
//! Each runtime implements `parley_core::RoomClient`, the seam through which
//! the assistant reads events and talks back.
//!
//! Available runtimes:
//! - **Memory**: In-process rooms with recorded side effects
//! - **Console**: Interactive terminal chat (stdin/stdout) on top of Memory

pub mod console;
pub mod memory;

pub use console::{CONSOLE_BOT, CONSOLE_ROOM, CONSOLE_USER, ConsoleRoom};
pub use memory::{MemoryRoom, MessageBuilder, Outgoing, Reaction, SentReply};
