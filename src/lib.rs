//! Chatpane - terminal chat client library
//!
//! This library provides the core of Chatpane: a renderer that turns chat
//! responses into safe markup and reveals them with a phased typing effect,
//! and a history store that keeps conversations in a bounded key-value
//! store.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `render`: Formatting pipelines, code blocks, images and the reveal
//! - `history`: Chat collection, pagination, quota eviction, export/import
//! - `storage`: Key-value store abstraction and persisted data types
//! - `session`: State machine tying store, renderer and backend together
//! - `client`: Chat endpoint client
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use chatpane::{HistoryStore, Renderer};
//! use chatpane::storage::{MemoryStore, Message};
//!
//! let history = HistoryStore::new(MemoryStore::new());
//! let chat_id = history.append(None, Message::user("Hello world")).unwrap();
//!
//! let renderer = Renderer::instant();
//! for message in history.page(&chat_id, 1).unwrap().messages {
//!     if let Some(job) = renderer.render(&message, false) {
//!         println!("{}", job.message().markup);
//!     }
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod render;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use client::{ChatBackend, HttpChatClient};
pub use config::Config;
pub use error::{ChatpaneError, Result};
pub use history::HistoryStore;
pub use render::Renderer;
pub use session::ChatSession;

#[cfg(test)]
pub mod test_utils;
