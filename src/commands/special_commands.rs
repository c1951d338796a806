//! Special commands parser for interactive chat mode
//!
//! Slash commands manage the session instead of being sent to the chat
//! server: browsing and editing history, switching theme, acting on the
//! last image, and leaving the session.
//!
//! Command names are case-insensitive; chat ids and titles are taken as typed.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// What to do with the most recent image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCommand {
    /// Write it to the current directory
    Save,
    /// Remove it from the chat, after confirmation
    Delete,
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Display help information
    Help,

    /// Start a new chat with the next message
    NewChat,

    /// List chats; `true` lists archived chats
    ListHistory(bool),

    /// Open a chat by id
    Open(String),

    /// Show the next page of the open chat
    More,

    /// Archive or unarchive a chat; the open chat when no id is given
    Archive(Option<String>),

    /// Rename a chat
    Rename { id: String, title: String },

    /// Delete a chat
    Delete(String),

    /// Delete every chat
    Clear,

    /// Switch between light and dark theme
    ToggleTheme,

    /// Act on the most recent image
    Image(ImageCommand),

    /// Copy a code block of the last reply (1-based, default the first)
    Copy(Option<usize>),

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the input as a message
    None,
}

fn missing(command: &str, usage: &str) -> CommandError {
    CommandError::MissingArgument {
        command: command.to_string(),
        usage: usage.to_string(),
    }
}

/// Parse user input into a special command
///
/// # Arguments
///
/// * `input` - The user's input line
///
/// # Returns
///
/// The parsed command, `SpecialCommand::None` for ordinary messages
///
/// # Errors
///
/// Returns `CommandError` for unknown commands and bad arguments
///
/// # Examples
///
/// ```
/// use chatpane::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/more").unwrap(), SpecialCommand::More);
/// assert_eq!(
///     parse_special_command("/open chat_01H").unwrap(),
///     SpecialCommand::Open("chat_01H".to_string())
/// );
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match command.as_str() {
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/new" => Ok(SpecialCommand::NewChat),
        "/history" => match rest.to_lowercase().as_str() {
            "" | "active" => Ok(SpecialCommand::ListHistory(false)),
            "archived" => Ok(SpecialCommand::ListHistory(true)),
            other => Err(CommandError::UnsupportedArgument {
                command: "/history".to_string(),
                arg: other.to_string(),
            }),
        },
        "/open" if rest.is_empty() => Err(missing("/open", "/open <chat_id>")),
        "/open" => Ok(SpecialCommand::Open(rest.to_string())),
        "/more" => Ok(SpecialCommand::More),
        "/archive" => Ok(SpecialCommand::Archive(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "/rename" => {
            let Some((id, title)) = rest.split_once(char::is_whitespace) else {
                return Err(missing("/rename", "/rename <chat_id> <title>"));
            };
            let title = title.trim();
            if title.is_empty() {
                return Err(missing("/rename", "/rename <chat_id> <title>"));
            }
            Ok(SpecialCommand::Rename {
                id: id.to_string(),
                title: title.to_string(),
            })
        }
        "/delete" if rest.is_empty() => Err(missing("/delete", "/delete <chat_id>")),
        "/delete" => Ok(SpecialCommand::Delete(rest.to_string())),
        "/clear" => Ok(SpecialCommand::Clear),
        "/theme" => Ok(SpecialCommand::ToggleTheme),
        "/image" => match rest.to_lowercase().as_str() {
            "save" | "download" => Ok(SpecialCommand::Image(ImageCommand::Save)),
            "delete" => Ok(SpecialCommand::Image(ImageCommand::Delete)),
            "" => Err(missing("/image", "/image <save|delete>")),
            other => Err(CommandError::UnsupportedArgument {
                command: "/image".to_string(),
                arg: other.to_string(),
            }),
        },
        "/copy" if rest.is_empty() => Ok(SpecialCommand::Copy(None)),
        "/copy" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => Ok(SpecialCommand::Copy(Some(n))),
            _ => Err(CommandError::UnsupportedArgument {
                command: "/copy".to_string(),
                arg: rest.to_string(),
            }),
        },
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print help for the interactive session
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

CHATS:
  /new                 - Start a new chat with your next message
  /history             - List active chats
  /history archived    - List archived chats
  /open <id>           - Open a chat (shows its first page)
  /more                - Show the next page of the open chat

EDITING:
  /archive [id]        - Archive or unarchive a chat (default: open chat)
  /rename <id> <title> - Rename a chat (at most 30 characters are kept)
  /delete <id>         - Delete a chat
  /clear               - Delete every chat

CODE:
  /copy [n]            - Copy code block n of the last reply (default: 1)

IMAGES:
  /image save          - Save the last image to the current directory
  /image delete        - Remove the last image from the chat

SESSION:
  /theme               - Toggle light and dark theme
  /help                - Show this help message
  /exit                - Exit interactive chat

Anything else is sent to the chat server.
"#
    );
}
