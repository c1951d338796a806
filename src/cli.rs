//! Command-line interface definition for Chatpane
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for chatting, managing history, and settings.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chatpane - terminal chat client with durable local history
///
/// Talk to a chat server, watch responses type out, and keep every
/// conversation in a local database you can browse, export and import.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatpane")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the history database location
    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Chatpane
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat
    Chat {
        /// Resume a chat by id instead of the last focused one
        #[arg(short, long)]
        resume: Option<String>,

        /// Show responses at once instead of typing them out
        #[arg(long)]
        no_animate: bool,
    },

    /// Browse and manage stored chats
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Write the whole chat history to a JSON file
    Export {
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the chat history with an exported JSON file
    Import {
        /// File produced by `export`
        file: PathBuf,
    },

    /// Show or change settings
    Settings {
        /// Chat API key (verified before saving)
        #[arg(long)]
        api_key: Option<String>,

        /// Image API key, must start with `hf_` (verified before saving)
        #[arg(long)]
        hf_api_key: Option<String>,

        /// Color theme: dark or light
        #[arg(long)]
        theme: Option<String>,
    },

    /// Format text from stdin once and print it
    Render {
        /// Use the user-message pipeline (links, line breaks)
        #[arg(long)]
        user: bool,

        /// Print markup instead of plain text
        #[arg(long)]
        html: bool,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List chats, newest first
    List {
        /// List archived chats instead of active ones
        #[arg(short, long)]
        archived: bool,
    },

    /// Show one page of a chat
    Show {
        /// Chat id
        id: String,

        /// Page number, from 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Print markup instead of plain text
        #[arg(long)]
        html: bool,
    },

    /// Archive or unarchive a chat
    Archive {
        /// Chat id
        id: String,
    },

    /// Rename a chat
    Rename {
        /// Chat id
        id: String,
        /// New title
        title: String,
    },

    /// Delete a chat
    Delete {
        /// Chat id
        id: String,
    },

    /// Delete every chat
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            storage_path: None,
            command: Commands::Chat {
                resume: None,
                no_animate: false,
            },
        }
    }
}
