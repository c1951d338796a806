//! Error types for Chatpane
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Chatpane operations
///
/// This enum encompasses the errors that can occur while loading
/// configuration, talking to the chat endpoint, persisting history,
/// and driving the session state machine.
#[derive(Error, Debug)]
pub enum ChatpaneError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value storage errors (open, read, write)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A write would push the stored values over the configured quota
    #[error("Storage quota exceeded: limit={limit} bytes, required={required} bytes")]
    QuotaExceeded {
        /// Configured quota in bytes
        limit: usize,
        /// Total bytes the write would have required
        required: usize,
    },

    /// The chat request could not be delivered
    #[error("Request failed: {0}")]
    Request(String),

    /// The server answered with an error payload or non-success status
    #[error("{0}")]
    Server(String),

    /// The server answered with something other than JSON
    #[error("Server returned non-JSON response")]
    NonJsonResponse,

    /// Missing API key
    #[error("{0}")]
    MissingCredentials(String),

    /// Session event not valid in the current state
    #[error("Invalid session transition: {event} while {from}")]
    InvalidTransition {
        /// State the session was in
        from: String,
        /// Event that was rejected
        event: String,
    },

    /// A message is already in flight
    #[error("A message is already being sent")]
    Busy,

    /// No chat with the given id
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    /// Import payload could not be used
    #[error("Import error: {0}")]
    Import(String),

    /// Attachment payload could not be decoded
    #[error("Image error: {0}")]
    Image(String),

    /// System clipboard unavailable or rejected the text
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Chatpane operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
