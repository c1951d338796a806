/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes these top-level command modules:

- `chat`     — Interactive chat session
- `transfer` — Export and import of the whole history
- `settings` — API keys and theme
- `render`   — One-shot formatting of text from stdin

History management lives in `history`, terminal output in `display`.
*/

use crate::client::HttpChatClient;
use crate::config::Config;
use crate::error::{ChatpaneError, Result};
use crate::history::HistoryStore;
use crate::render::Renderer;
use crate::session::ChatSession;
use crate::storage::SledStore;
use colored::Colorize;

// Terminal output for messages and listings
pub mod display;

// History subcommands
pub mod history;

// Special commands parser for the interactive session
pub mod special_commands;

/// Open the history database named by `config`
///
/// # Errors
///
/// Returns `ChatpaneError::Storage` if the database cannot be opened
pub fn open_history(config: &Config) -> Result<HistoryStore<SledStore>> {
    let path = config.storage_path()?;
    let store = SledStore::open(&path, config.storage.quota())?;
    Ok(HistoryStore::with_settings(
        store,
        config.storage.history_settings(),
    ))
}

/// Build a session over the configured database and endpoint
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the HTTP client
/// cannot be created
pub fn open_session(config: &Config) -> Result<ChatSession<HttpChatClient, SledStore>> {
    let history = open_history(config)?;
    let backend = HttpChatClient::new(config.endpoint.clone())?;
    let renderer = Renderer::new(config.render.schedule()).with_animation(config.render.animate);
    Ok(ChatSession::new(history, backend, renderer))
}

/// Ask a yes/no question on stdin; anything but `y`/`yes` is a no
pub fn confirm_stdin(question: &str) -> Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

// Chat command handler
pub mod chat {
    //! Interactive chat session.
    //!
    //! Opens the history database, resumes the focused chat and runs a
    //! readline loop. Plain lines are sent to the chat server; slash
    //! commands manage history, theme, images and code copies.

    use super::display;
    use super::special_commands::{parse_special_command, print_help, ImageCommand, SpecialCommand};
    use super::*;
    use crate::client::ChatBackend;
    use crate::render::{
        CodeBlock, CopyButton, ImageAction, ImageEffect, ImageView, RenderJob, RenderedMessage,
    };
    use crate::session::{Feedback, HistoryView, SubmitOutcome};
    use crate::storage::KeyValueStore;
    use chrono::Utc;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::time::Instant;

    /// What the last shown reply offers to act on
    #[derive(Debug, Default)]
    struct Shown {
        image: Option<ImageView>,
        code_blocks: Vec<CodeBlock>,
        copy: CopyButton,
    }

    impl Shown {
        /// Newest image and newest response code among `messages`
        fn from_messages(messages: &[RenderedMessage]) -> Self {
            let image = messages
                .iter()
                .rev()
                .find_map(|m| m.image.clone())
                .map(ImageView::new);
            let code_blocks = messages
                .iter()
                .rev()
                .find(|m| !m.is_user)
                .map(|m| m.code_blocks.clone())
                .unwrap_or_default();
            Self {
                image,
                code_blocks,
                copy: CopyButton::new(),
            }
        }

        /// Take over the code and image of a freshly shown response
        fn absorb(&mut self, message: RenderedMessage) {
            self.code_blocks = message.code_blocks;
            self.copy = CopyButton::new();
            if let Some(image) = message.image {
                self.image = Some(ImageView::new(image));
            }
        }

        /// Code block `index` (1-based, default 1)
        fn code(&self, index: Option<usize>) -> Option<&CodeBlock> {
            index
                .unwrap_or(1)
                .checked_sub(1)
                .and_then(|i| self.code_blocks.get(i))
        }

        /// Label to show in the prompt while a copy is being confirmed
        fn copy_marker(&mut self, now: Instant) -> Option<&'static str> {
            if self.copy.tick(now) {
                tracing::trace!("Copy confirmation expired");
            }
            self.copy
                .is_confirming(now)
                .then(|| self.copy.label(now))
        }
    }

    /// Start the interactive chat session
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `resume` - Chat to open instead of the last focused one
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::ChatNotFound` when `resume` names no chat
    ///
    /// # Examples
    ///
    /// ```
    /// use chatpane::commands::chat;
    /// use chatpane::config::Config;
    ///
    /// // In application code:
    /// // chat::run_chat(Config::default(), None).await?;
    /// ```
    pub async fn run_chat(config: Config, resume: Option<String>) -> Result<()> {
        tracing::info!("Starting interactive chat");

        let mut session = open_session(&config)?;
        let mut rl = DefaultEditor::new()?;
        let mut shown = Shown::default();

        print_welcome_banner(&session);

        let target = resume.clone().or_else(|| session.current_chat_id());
        if let Some(id) = target {
            match session.open_chat(&id) {
                Some(view) => {
                    display::print_chat_view(&view, session.theme());
                    shown = Shown::from_messages(&view.messages);
                }
                None if resume.is_some() => return Err(ChatpaneError::ChatNotFound(id).into()),
                None => tracing::debug!("Focused chat {} is gone", id),
            }
        }

        loop {
            let tag = session.theme().colored_tag();
            let prompt = match shown.copy_marker(Instant::now()) {
                Some(label) => format!("{} {} >> ", tag, label.green()),
                None => format!("{} >> ", tag),
            };
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::None) => {}
                        Ok(SpecialCommand::Exit) => break,
                        Ok(command) => {
                            if let Err(e) =
                                handle_command(&mut session, command, &mut rl, &mut shown)
                            {
                                eprintln!("{}", e.to_string().red());
                            }
                            continue;
                        }
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    }

                    match display::with_thinking(session.submit(trimmed)).await {
                        Ok(outcome) => {
                            if let Some(message) = present_outcome(&mut session, outcome).await {
                                shown.absorb(message);
                            }
                        }
                        Err(e) => eprintln!("{}", e.to_string().yellow()),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Show a submit outcome; returns the response that was shown, if any
    async fn present_outcome<B: ChatBackend, S: KeyValueStore>(
        session: &mut ChatSession<B, S>,
        outcome: SubmitOutcome,
    ) -> Option<RenderedMessage> {
        let theme = session.theme();
        match outcome {
            SubmitOutcome::Ignored => None,
            SubmitOutcome::Failed { notice, .. } => {
                display::print_message(&notice, theme);
                None
            }
            SubmitOutcome::Replied { response: None, .. } => {
                println!("{}", "(empty response)".dimmed());
                None
            }
            SubmitOutcome::Replied {
                response: Some(RenderJob::Instant(message)),
                ..
            } => {
                display::print_message(&message, theme);
                Some(message)
            }
            SubmitOutcome::Replied {
                response: Some(RenderJob::Animated(pending)),
                ..
            } => {
                display::play_reveal(pending.reveal, &pending.message, theme).await;
                if let Err(e) = session.reveal_complete() {
                    tracing::warn!("{}", e);
                }
                Some(pending.message)
            }
        }
    }

    fn confirm(rl: &mut DefaultEditor, question: &str) -> bool {
        match rl.readline(&format!("{} [y/N] ", question)) {
            Ok(answer) => is_yes(&answer),
            Err(_) => false,
        }
    }

    fn print_feedback(feedback: &Feedback, shown: &mut Shown) {
        println!("{}", feedback.toast.green());
        if feedback.reset_display {
            *shown = Shown::default();
            println!(
                "{}",
                "Display cleared. Your next message starts a new chat.".dimmed()
            );
        }
    }

    fn not_found(id: &str) {
        println!("{}", format!("Chat not found: {}", id).yellow());
    }

    fn handle_command<B: ChatBackend, S: KeyValueStore>(
        session: &mut ChatSession<B, S>,
        command: SpecialCommand,
        rl: &mut DefaultEditor,
        shown: &mut Shown,
    ) -> Result<()> {
        match command {
            SpecialCommand::Help => print_help(),
            SpecialCommand::NewChat => {
                session.new_chat();
                *shown = Shown::default();
                println!("{}", "Started a new chat.".green());
            }
            SpecialCommand::ListHistory(archived) => {
                if (session.view() == HistoryView::Archived) != archived {
                    session.toggle_history_view();
                }
                display::print_chat_table(&session.chats(), archived);
                let hint = if archived {
                    "Use /history to show active chats"
                } else {
                    "Use /history archived to show archived chats"
                };
                println!("{}", hint.dimmed());
            }
            SpecialCommand::Open(id) => match session.open_chat(&id) {
                Some(view) => {
                    display::print_chat_view(&view, session.theme());
                    *shown = Shown::from_messages(&view.messages);
                }
                None => not_found(&id),
            },
            SpecialCommand::More => match session.next_page() {
                Some(view) => display::print_chat_view(&view, session.theme()),
                None => println!("{}", "No more messages.".yellow()),
            },
            SpecialCommand::Archive(id) => {
                let Some(id) = id.or_else(|| session.current_chat_id()) else {
                    println!("{}", "No chat is open. Use /archive <id>".yellow());
                    return Ok(());
                };
                match session.toggle_archive(&id) {
                    Some(feedback) => print_feedback(&feedback, shown),
                    None => not_found(&id),
                }
            }
            SpecialCommand::Rename { id, title } => match session.relabel(&id, &title) {
                Some(feedback) => print_feedback(&feedback, shown),
                None => not_found(&id),
            },
            SpecialCommand::Delete(id) => {
                if !confirm(rl, "Are you sure you want to delete this chat?") {
                    return Ok(());
                }
                match session.delete_chat(&id) {
                    Some(feedback) => print_feedback(&feedback, shown),
                    None => not_found(&id),
                }
            }
            SpecialCommand::Clear => {
                if !confirm(
                    rl,
                    "Are you sure you want to clear all conversations? This cannot be undone.",
                ) {
                    return Ok(());
                }
                match session.clear_all() {
                    Some(feedback) => print_feedback(&feedback, shown),
                    None => eprintln!("{}", "Failed to clear conversations".red()),
                }
            }
            SpecialCommand::ToggleTheme => {
                let theme = session.toggle_theme();
                println!("Switched to {} ({})", theme.colored_tag(), theme.description());
            }
            SpecialCommand::Image(action) => {
                let Some(view) = shown.image.as_mut() else {
                    println!("{}", "No image to act on.".yellow());
                    return Ok(());
                };
                handle_image(session, view, action, rl)?;
                if view.is_removed() {
                    shown.image = None;
                }
            }
            SpecialCommand::Copy(index) => {
                let Some(block) = shown.code(index) else {
                    println!("{}", "No such code block in the last reply.".yellow());
                    return Ok(());
                };
                copy_to_clipboard(&block.code)?;
                let now = Instant::now();
                shown.copy.mark_copied(now);
                println!("{}", shown.copy.label(now).green());
            }
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
        Ok(())
    }

    fn copy_to_clipboard(text: &str) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ChatpaneError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| ChatpaneError::Clipboard(e.to_string()))?;
        tracing::debug!("Copied {} bytes to clipboard", text.len());
        Ok(())
    }

    fn handle_image<B: ChatBackend, S: KeyValueStore>(
        session: &mut ChatSession<B, S>,
        view: &mut ImageView,
        action: ImageCommand,
        rl: &mut DefaultEditor,
    ) -> Result<()> {
        let now = Utc::now();
        let action = match action {
            ImageCommand::Save => ImageAction::Download,
            ImageCommand::Delete => ImageAction::Delete {
                confirmed: confirm(rl, "Are you sure you want to delete this image?"),
            },
        };

        match view.handle(action, now) {
            ImageEffect::Save { .. } => {
                let dir = std::env::current_dir()?;
                let path = view.attachment().save_to(&dir, now)?;
                println!("{}", format!("Saved {}", path.display()).green());
            }
            ImageEffect::Remove { image_data } => match session.delete_image(&image_data) {
                Some(count) => {
                    tracing::debug!("Cleared image from {} message(s)", count);
                    println!("{}", "Image deleted".green());
                }
                None => println!("{}", "Image removed from view only".yellow()),
            },
            _ => {}
        }
        Ok(())
    }

    fn print_welcome_banner<B: ChatBackend, S: KeyValueStore>(session: &ChatSession<B, S>) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║              Chatpane Interactive Chat - Welcome!            ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        let theme = session.theme();
        println!("Theme:  {} ({})", theme.colored_tag(), theme.description());
        if session.history().preferences().api_key.is_none() {
            println!(
                "{}",
                "No API key stored. Run `chatpane settings --api-key <KEY>` first.".yellow()
            );
        }
        println!("\nType '/help' for available commands, 'exit' to quit\n");
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::render::ImageAttachment;
        use std::time::Duration;

        fn reply(is_user: bool, code: &[&str], image: Option<&str>) -> RenderedMessage {
            RenderedMessage {
                is_user,
                markup: String::new(),
                code_blocks: code
                    .iter()
                    .map(|c| CodeBlock {
                        language: None,
                        code: c.to_string(),
                    })
                    .collect(),
                image: image.map(ImageAttachment::new),
            }
        }

        #[test]
        fn test_shown_takes_newest_response_code_and_image() {
            let messages = vec![
                reply(false, &["old"], Some("aGk=")),
                reply(false, &["a = 1", "b = 2"], None),
                reply(true, &["typed by user"], None),
            ];
            let shown = Shown::from_messages(&messages);
            assert_eq!(shown.code(None).unwrap().code, "a = 1");
            assert_eq!(shown.code(Some(2)).unwrap().code, "b = 2");
            assert!(shown.code(Some(3)).is_none());
            assert!(shown.code(Some(0)).is_none());
            assert!(shown.image.is_some());
        }

        #[test]
        fn test_absorb_keeps_earlier_image_when_reply_has_none() {
            let mut shown = Shown::from_messages(&[reply(false, &[], Some("aGk="))]);
            shown.copy.mark_copied(Instant::now());
            shown.absorb(reply(false, &["print(1)"], None));
            assert!(shown.image.is_some());
            assert_eq!(shown.code(None).unwrap().code, "print(1)");
            assert_eq!(shown.copy, CopyButton::new());
        }

        #[test]
        fn test_copy_marker_shows_then_reverts() {
            let mut shown = Shown::default();
            let copied = Instant::now();
            assert_eq!(shown.copy_marker(copied), None);

            shown.copy.mark_copied(copied);
            assert_eq!(shown.copy_marker(copied + Duration::from_secs(1)), Some("Copied!"));
            assert_eq!(shown.copy_marker(copied + Duration::from_secs(3)), None);
            assert_eq!(shown.copy, CopyButton::new());
        }
    }
}

/// Export and import commands
pub mod transfer {
    use super::*;
    use std::path::{Path, PathBuf};

    /// Default file name for exports
    pub const DEFAULT_EXPORT_FILE: &str = "chat_history.json";

    /// Write the whole history to `output` (default `chat_history.json`)
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the file
    /// cannot be written
    pub fn run_export(config: &Config, output: Option<PathBuf>) -> Result<PathBuf> {
        let history = open_history(config)?;
        let path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE));
        std::fs::write(&path, history.export())?;
        tracing::info!("Exported history to {}", path.display());
        println!(
            "{}",
            format!("Exported chat history to {}", path.display()).green()
        );
        Ok(path)
    }

    /// Replace the history with the contents of `file`
    ///
    /// The stored history is left untouched when the file is not a valid
    /// export.
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::Import` if the file is unreadable or invalid
    pub fn run_import(config: &Config, file: &Path) -> Result<usize> {
        let snapshot = std::fs::read_to_string(file).map_err(|e| {
            ChatpaneError::Import(format!("Failed to read {}: {}", file.display(), e))
        })?;

        let history = open_history(config)?;
        match history.import(&snapshot) {
            Ok(count) => {
                println!("{}", "Chat history imported successfully".green());
                Ok(count)
            }
            Err(e) => {
                eprintln!("{}", "Error importing chat history".red());
                Err(e)
            }
        }
    }
}

/// Settings command
pub mod settings {
    use super::*;
    use crate::session::Theme;

    /// Verify and store keys, change the theme, then print the settings
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::Config` for an unknown theme or a key that
    /// fails verification
    pub async fn run_settings(
        config: &Config,
        api_key: Option<String>,
        hf_api_key: Option<String>,
        theme: Option<String>,
    ) -> Result<()> {
        let mut session = open_session(config)?;

        if let Some(theme) = theme {
            let wanted = Theme::parse_str(&theme).map_err(ChatpaneError::Config)?;
            if session.theme() != wanted {
                session.toggle_theme();
            }
            println!("Theme set to {}", session.theme().colored_tag());
        }

        if api_key.is_some() || hf_api_key.is_some() {
            let outcome = session
                .save_settings(
                    api_key.as_deref().unwrap_or_default(),
                    hf_api_key.as_deref().unwrap_or_default(),
                )
                .await;
            if !outcome.saved {
                return Err(ChatpaneError::Config(outcome.message).into());
            }
            println!("{}", outcome.message.green());
        }

        let preferences = session.history().preferences();
        println!("Theme:       {}", session.theme().colored_tag());
        println!("API key:     {}", mask(preferences.api_key.as_deref()));
        println!("HF API key:  {}", mask(preferences.hf_api_key.as_deref()));
        Ok(())
    }

    /// Show only the last four characters of a stored key
    pub fn mask(key: Option<&str>) -> String {
        match key.filter(|k| !k.is_empty()) {
            None => "(not set)".to_string(),
            Some(k) if k.chars().count() <= 4 => "****".to_string(),
            Some(k) => {
                let tail: String = k.chars().skip(k.chars().count() - 4).collect();
                format!("****{}", tail)
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mask_keys() {
            assert_eq!(mask(None), "(not set)");
            assert_eq!(mask(Some("")), "(not set)");
            assert_eq!(mask(Some("abc")), "****");
            assert_eq!(mask(Some("hf_secret1234")), "****1234");
        }
    }
}

/// One-shot render command
pub mod render {
    use super::*;
    use crate::render::{format_response, format_user, plain_text};
    use std::io::Read;

    /// Format `input` with the user or response pipeline
    ///
    /// # Examples
    ///
    /// ```
    /// use chatpane::commands::render::render_text;
    ///
    /// assert_eq!(render_text("**hi**", false, true), "<p><strong>hi</strong></p>");
    /// assert_eq!(render_text("**hi**", false, false), "hi");
    /// ```
    pub fn render_text(input: &str, user: bool, html: bool) -> String {
        let markup = if user {
            format_user(input)
        } else {
            format_response(input).markup
        };
        if html {
            markup
        } else {
            plain_text(&markup)
        }
    }

    /// Read stdin, format it and print the result
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::Io` if stdin cannot be read
    pub fn run_render(user: bool, html: bool) -> Result<()> {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        println!("{}", render_text(&input, user, html));
        Ok(())
    }

}
