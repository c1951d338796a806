//! Terminal presentation of rendered messages
//!
//! Markup produced by the renderer is reduced to plain text as it is
//! printed. Code blocks are printed whole through `TerminalHighlighter`,
//! and fresh responses are typed out by driving the reveal stream.

use crate::render::code_block::CODE_BLOCK_MARKER;
use crate::render::image::IMAGE_BLOCK_MARKER;
use crate::render::{
    unescape_html, CodeBlock, PhaseSchedule, RenderedMessage, Reveal, RevealStep, StepKind,
    SyntaxHighlighter,
};
use crate::session::{ChatView, Theme};
use crate::storage::ChatSummary;
use colored::Colorize;
use futures::StreamExt;
use prettytable::{format, Table};
use regex::Regex;
use std::future::Future;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

/// Interval between dots of the waiting indicator
const THINKING_TICK: Duration = Duration::from_millis(400);

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"))
}

/// Highlights code blocks with terminal colors
#[derive(Debug, Clone, Copy)]
pub struct TerminalHighlighter {
    theme: Theme,
}

impl TerminalHighlighter {
    /// Create a highlighter for `theme`
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }
}

impl SyntaxHighlighter for TerminalHighlighter {
    fn highlight(&self, block: &CodeBlock) -> String {
        let mut out = format!("┌─ {}\n", block.label().bold());
        for line in block.code.lines() {
            let line = if self.theme.is_dark() {
                line.bright_green()
            } else {
                line.blue()
            };
            out.push_str(&format!("│ {}\n", line));
        }
        out.push_str("└─");
        out
    }
}

/// Plain text for one markup fragment, keeping paragraph and line breaks
///
/// Unlike `render::plain_text` the result is not trimmed, so fragments
/// can be printed one after another.
pub fn fragment_text(fragment: &str) -> String {
    let text = fragment
        .replace("</p><p>", "\n\n")
        .replace("<br>", "\n");
    unescape_html(&tag_regex().replace_all(&text, ""))
}

fn step_text(
    step: &RevealStep,
    message: &RenderedMessage,
    highlighter: &TerminalHighlighter,
) -> String {
    match step.kind {
        StepKind::CodeBlock { index } => match message.code_blocks.get(index) {
            Some(block) => {
                // tags still pending before the block, e.g. a paragraph break
                let root = format!("<div {}", CODE_BLOCK_MARKER);
                let lead = step
                    .fragment
                    .find(&root)
                    .map(|pos| fragment_text(&step.fragment[..pos]))
                    .unwrap_or_default();
                format!("{}\n{}\n", lead, highlighter.highlight(block))
            }
            None => fragment_text(&step.fragment),
        },
        // the image is announced by the hint printed after the message
        StepKind::Image => {
            let root = format!("<div {}", IMAGE_BLOCK_MARKER);
            step.fragment
                .find(&root)
                .map(|pos| fragment_text(&step.fragment[..pos]))
                .unwrap_or_default()
        }
        StepKind::Text | StepKind::Trailing => fragment_text(&step.fragment),
    }
}

fn speaker(message: &RenderedMessage) -> String {
    if message.is_user {
        format!("{} ", "You:".bold().cyan())
    } else {
        format!("{} ", "Bot:".bold().magenta())
    }
}

fn print_image_hint(message: &RenderedMessage) {
    if let Some(image) = &message.image {
        println!(
            "{}",
            format!(
                "[image: {}, use /image save or /image delete]",
                image.mime_type()
            )
            .dimmed()
        );
    }
}

/// Print a message in full
pub fn print_message(message: &RenderedMessage, theme: Theme) {
    let highlighter = TerminalHighlighter::new(theme);
    let mut out = speaker(message);
    for step in Reveal::new(message.markup.clone(), PhaseSchedule::instant()) {
        out.push_str(&step_text(&step, message, &highlighter));
    }
    println!("{}", out.trim_end());
    print_image_hint(message);
}

/// Type a fresh response out, pausing between steps as scheduled
pub async fn play_reveal(reveal: Reveal, message: &RenderedMessage, theme: Theme) {
    let highlighter = TerminalHighlighter::new(theme);
    let mut stdout = std::io::stdout();

    print!("{}", speaker(message));
    let mut steps = Box::pin(reveal.into_stream());
    while let Some(step) = steps.next().await {
        print!("{}", step_text(&step, message, &highlighter));
        let _ = stdout.flush();
    }
    println!();
    print_image_hint(message);
}

/// Await `work` behind a "Thinking" line that grows a dot per tick
///
/// The line is erased before the output is returned.
pub async fn with_thinking<F: Future>(work: F) -> F::Output {
    let mut stdout = std::io::stdout();
    print!("{}", "Thinking".dimmed());
    let _ = stdout.flush();

    tokio::pin!(work);
    let mut ticker = tokio::time::interval(THINKING_TICK);
    ticker.tick().await;
    let output = loop {
        tokio::select! {
            output = &mut work => break output,
            _ = ticker.tick() => {
                print!("{}", ".".dimmed());
                let _ = stdout.flush();
            }
        }
    };

    print!("\r\x1b[K");
    let _ = stdout.flush();
    output
}

/// Print one page of a chat
pub fn print_chat_view(view: &ChatView, theme: Theme) {
    println!();
    println!(
        "{} {} (page {})",
        view.title.bold(),
        format!("[{}]", view.chat_id).cyan(),
        view.page
    );
    println!();
    for message in &view.messages {
        print_message(message, theme);
        println!();
    }
    if view.has_more {
        println!("{}", "More messages available, use /more".dimmed());
    }
}

fn short_title(title: &str) -> String {
    if title.chars().count() > 40 {
        format!("{}...", title.chars().take(37).collect::<String>())
    } else {
        title.to_string()
    }
}

/// Print a table of chats, or a note when there are none
pub fn print_chat_table(chats: &[ChatSummary], archived: bool) {
    if chats.is_empty() {
        let note = if archived {
            "No archived conversations found."
        } else {
            "No conversation history found."
        };
        println!("{}", note.yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Created".bold()
    ]);

    for chat in chats {
        table.add_row(prettytable::row![
            chat.id.cyan(),
            short_title(&chat.title),
            chat.message_count,
            chat.timestamp.format("%Y-%m-%d %H:%M").to_string()
        ]);
    }

    if archived {
        println!("\nArchived Conversations:");
    } else {
        println!("\nConversation History:");
    }
    table.printstd();
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::format_response;

    #[tokio::test]
    async fn test_thinking_waits_for_slow_work() {
        let started = std::time::Instant::now();
        let answer = with_thinking(async {
            tokio::time::sleep(Duration::from_millis(450)).await;
            42
        })
        .await;
        assert_eq!(answer, 42);
        assert!(started.elapsed() >= Duration::from_millis(450));
    }

    #[tokio::test]
    async fn test_thinking_passes_errors_through() {
        let result: Result<(), String> = with_thinking(async { Err("offline".to_string()) }).await;
        assert_eq!(result, Err("offline".to_string()));
    }

    #[test]
    fn test_fragment_text_keeps_breaks() {
        assert_eq!(fragment_text("<p>H"), "H");
        assert_eq!(fragment_text("</p><p>x"), "\n\nx");
        assert_eq!(fragment_text("<br>"), "\n");
        assert_eq!(fragment_text("&amp;"), "&");
        assert_eq!(fragment_text(" "), " ");
        assert_eq!(fragment_text("</strong></p>"), "");
    }

    #[test]
    fn test_highlighter_frames_code() {
        colored::control::set_override(false);
        let block = CodeBlock {
            language: Some("py".to_string()),
            code: "print(1)\nprint(2)".to_string(),
        };
        let out = TerminalHighlighter::new(Theme::Dark).highlight(&block);
        assert_eq!(out, "┌─ py\n│ print(1)\n│ print(2)\n└─");
    }

    #[test]
    fn test_steps_print_code_block_once() {
        colored::control::set_override(false);
        let formatted = format_response("Here: ```py\nprint(1)\n``` done");
        let message = RenderedMessage {
            is_user: false,
            markup: formatted.markup,
            code_blocks: formatted.code_blocks,
            image: None,
        };
        let highlighter = TerminalHighlighter::new(Theme::Light);
        let text: String = Reveal::new(message.markup.clone(), PhaseSchedule::instant())
            .map(|step| step_text(&step, &message, &highlighter))
            .collect();
        assert_eq!(text, "Here: \n┌─ py\n│ print(1)\n└─\n done");
    }

    #[test]
    fn test_image_block_prints_nothing_itself() {
        colored::control::set_override(false);
        let message = crate::render::Renderer::instant()
            .render(&crate::storage::Message::bot("A dot").with_image("aGk="), false)
            .unwrap()
            .message()
            .clone();
        let highlighter = TerminalHighlighter::new(Theme::Light);
        let text: String = Reveal::new(message.markup.clone(), PhaseSchedule::instant())
            .map(|step| step_text(&step, &message, &highlighter))
            .collect();
        assert_eq!(text, "A dot");
    }

    #[test]
    fn test_short_title_truncates_long_titles() {
        assert_eq!(short_title("short"), "short");
        let long = "a".repeat(50);
        assert_eq!(short_title(&long), format!("{}...", "a".repeat(37)));
    }
}
