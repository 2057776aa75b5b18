//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- History traversal ---
    #[error("Decryption error: could not decrypt event {event_id}")]
    Decryption { event_id: String },

    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Room collaborator errors ---
    #[error("Room error: {0}")]
    Room(#[from] RoomError),

    // --- Backend/model selection ---
    #[error("{0}")]
    Selection(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure of a single completion call. Adapters report every failure through
/// this type instead of panicking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("HTTP request failed with status {status_code}: {message}")]
    Http { status_code: u16, message: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("Backend reported an error: {0}")]
    Backend(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl BackendError {
    /// The HTTP status carried by this failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Failure reported by the hosting chat runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoomError {
    #[error("Event not found: {event_id} in {room_id}")]
    EventNotFound { room_id: String, event_id: String },

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Message delivery failed to {room_id}: {reason}")]
    DeliveryFailed { room_id: String, reason: String },

    #[error("Room transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_displays_status() {
        let err = Error::Backend(BackendError::Http {
            status_code: 500,
            message: "upstream exploded".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn status_code_only_for_http() {
        let http = BackendError::Http {
            status_code: 429,
            message: String::new(),
        };
        assert_eq!(http.status_code(), Some(429));
        assert_eq!(BackendError::Decode("x".into()).status_code(), None);
    }

    #[test]
    fn config_shorthand() {
        let err = Error::config("too many additional prompts");
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("too many additional prompts"));
    }

    #[test]
    fn decryption_error_names_event() {
        let err = Error::Decryption {
            event_id: "$abc".into(),
        };
        assert!(err.to_string().contains("$abc"));
    }
}
