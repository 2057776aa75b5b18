//! Console room: interactive terminal chat.
//!
//! A two-party [`MemoryRoom`] whose human member types on stdin. Each line
//! becomes a text message event; the bot's replies and reactions come back
//! through the room's outbox. Used for `parley chat`.

use std::sync::Arc;

use parley_core::room::RoomEvent;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::memory::{MemoryRoom, MessageBuilder, Outgoing};

pub const CONSOLE_ROOM: &str = "!console:localhost";
pub const CONSOLE_BOT: &str = "@parley:localhost";
pub const CONSOLE_USER: &str = "@you:localhost";

/// Interactive console session.
pub struct ConsoleRoom {
    room: Arc<MemoryRoom>,
}

impl ConsoleRoom {
    /// Create the session and the receiver of everything the bot sends.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let room = MemoryRoom::new(CONSOLE_BOT).with_outbox(tx);
        room.create_room(CONSOLE_ROOM, &[CONSOLE_USER]);
        room.set_display_name(CONSOLE_USER, "you");
        (Self { room: Arc::new(room) }, rx)
    }

    pub fn room(&self) -> Arc<MemoryRoom> {
        self.room.clone()
    }

    /// Read stdin; each non-empty line becomes a message event.
    pub fn start(&self) -> mpsc::Receiver<RoomEvent> {
        self.start_with(BufReader::new(io::stdin()))
    }

    /// Read messages from any line source. The stream ends on EOF or an exit
    /// command (`exit`, `quit`, `/exit`, `/quit`, `:q`).
    pub fn start_with<R>(&self, reader: R) -> mpsc::Receiver<RoomEvent>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let room = self.room.clone();

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if matches!(line.as_str(), "exit" | "quit" | "/exit" | "/quit" | ":q") {
                            break;
                        }

                        let event = room.post(MessageBuilder::text(CONSOLE_ROOM, CONSOLE_USER, line));
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        warn!(error = %e, "Console input failed");
                        break;
                    }
                }
            }
        });

        rx
    }
}
