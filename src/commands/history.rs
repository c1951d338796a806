use super::display;
use super::{confirm_stdin, open_history};
use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::{ChatpaneError, Result};
use crate::render::Renderer;
use crate::session::{Theme, MAX_TITLE_CHARS};
use crate::storage::ChatFilter;
use colored::Colorize;

/// Handle history commands
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let history = open_history(config)?;

    match command {
        HistoryCommand::List { archived } => {
            let filter = if archived {
                ChatFilter::Archived
            } else {
                ChatFilter::Active
            };
            display::print_chat_table(&history.list(filter), archived);
            if !archived {
                println!(
                    "Use {} to resume a chat.",
                    "chatpane chat --resume <ID>".cyan()
                );
                println!();
            }
        }
        HistoryCommand::Show { id, page, html } => {
            let chat = history
                .get(&id)
                .ok_or_else(|| ChatpaneError::ChatNotFound(id.clone()))?;
            let window = history
                .page(&id, page.max(1))
                .ok_or_else(|| ChatpaneError::ChatNotFound(id.clone()))?;

            let renderer = Renderer::instant();
            let theme = Theme::from_dark_mode(history.preferences().dark_mode);
            let rendered: Vec<_> = window
                .messages
                .iter()
                .filter_map(|m| renderer.render(m, false))
                .map(|job| job.message().clone())
                .collect();

            if html {
                for message in &rendered {
                    println!("{}", message.markup);
                }
            } else {
                let view = crate::session::ChatView {
                    chat_id: chat.id,
                    title: chat.title,
                    page: page.max(1),
                    messages: rendered,
                    has_more: window.has_more,
                };
                display::print_chat_view(&view, theme);
            }
        }
        HistoryCommand::Archive { id } => {
            let archived = history
                .toggle_archive(&id)
                .ok_or_else(|| ChatpaneError::ChatNotFound(id.clone()))?;
            let toast = if archived {
                "Chat archived"
            } else {
                "Chat unarchived"
            };
            println!("{}", toast.green());
        }
        HistoryCommand::Rename { id, title } => {
            let title: String = title.trim().chars().take(MAX_TITLE_CHARS).collect();
            if history.get(&id).is_none() {
                return Err(ChatpaneError::ChatNotFound(id).into());
            }
            if !history.relabel(&id, &title) {
                return Err(ChatpaneError::Storage(format!("Failed to rename chat {}", id)).into());
            }
            println!("{}", "Chat label updated".green());
        }
        HistoryCommand::Delete { id } => {
            if !history.delete(&id) {
                return Err(ChatpaneError::ChatNotFound(id).into());
            }
            println!("{}", format!("Deleted conversation {}", id).green());
        }
        HistoryCommand::Clear { yes } => {
            if !yes
                && !confirm_stdin(
                    "Are you sure you want to clear all conversations? This cannot be undone.",
                )?
            {
                println!("Cancelled.");
                return Ok(());
            }
            if !history.clear_all() {
                return Err(ChatpaneError::Storage("Failed to clear conversations".to_string()).into());
            }
            println!("{}", "All conversations cleared".green());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Message;
    use crate::test_utils::{temp_dir, test_config};

    fn seed(config: &Config) -> String {
        let history = open_history(config).unwrap();
        history.append(None, Message::user("Hello")).unwrap()
    }

    #[test]
    fn test_archive_and_rename_existing_chat() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let id = seed(&config);

        handle_history(&config, HistoryCommand::Archive { id: id.clone() }).unwrap();
        handle_history(
            &config,
            HistoryCommand::Rename {
                id: id.clone(),
                title: "x".repeat(45),
            },
        )
        .unwrap();

        let history = open_history(&config).unwrap();
        let chat = history.get(&id).unwrap();
        assert!(chat.archived);
        assert_eq!(chat.title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_unknown_chat_is_reported() {
        let dir = temp_dir();
        let config = test_config(&dir);

        let err = handle_history(
            &config,
            HistoryCommand::Delete {
                id: "chat_missing".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Chat not found: chat_missing");

        assert!(handle_history(
            &config,
            HistoryCommand::Show {
                id: "chat_missing".to_string(),
                page: 1,
                html: false,
            },
        )
        .is_err());
    }

    #[test]
    fn test_clear_with_yes_skips_prompt() {
        let dir = temp_dir();
        let config = test_config(&dir);
        seed(&config);

        handle_history(&config, HistoryCommand::Clear { yes: true }).unwrap();
        let history = open_history(&config).unwrap();
        assert!(history.list(ChatFilter::Active).is_empty());
    }
}
