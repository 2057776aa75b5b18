//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley chat-room
//! assistant. This crate has **zero framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two seams of the system are defined as traits here:
//! - [`Backend`]: a language-model provider (remote API or local server)
//! - [`RoomClient`]: the hosting chat runtime (events, membership, replies)
//!
//! Implementations live in their respective crates, so the assistant logic
//! can be driven against real services or in-memory stand-ins.

pub mod backend;
pub mod error;
pub mod event;
pub mod message;
pub mod room;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, Completion, CompletionRequest, CompletionResult};
pub use error::{BackendError, Error, Result, RoomError};
pub use event::{DomainEvent, EventBus};
pub use message::{ChatMessage, PromptContext, Role};
pub use room::{
    EventContent, HistoryCursor, HistoryPage, MessageContent, MessageType, Relation,
    RelationKind, RoomClient, RoomEvent,
};
