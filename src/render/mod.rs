//! Message rendering
//!
//! Turns raw message text into safe markup. Bot responses go through the
//! full pipeline (fenced code extraction, emphasis, paragraphs, code block
//! fragments) and, when freshly received, are revealed with a phased
//! typing effect. User messages get the light pipeline (links and line
//! breaks) and always render instantly.
//!
//! # Examples
//!
//! ```
//! use chatpane::render::format_response;
//!
//! let formatted = format_response("Hello **world**");
//! assert_eq!(formatted.markup, "<p>Hello <strong>world</strong></p>");
//! ```

pub mod code_block;
pub mod image;
pub mod reveal;

pub use code_block::{CodeBlock, CopyButton, SyntaxHighlighter, DEFAULT_LANGUAGE_LABEL};
pub use image::{ImageAction, ImageAttachment, ImageEffect, ImageView};
pub use reveal::{Phase, PhaseSchedule, Reveal, RevealStep, StepKind};

use crate::storage::Message;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Placeholder standing in for the n-th code block while text is formatted
///
/// NUL cannot survive into the text (it is stripped on entry), so a
/// placeholder can never collide with message content.
fn placeholder(index: usize) -> String {
    format!("\u{0}CODEBLOCK{}\u{0}", index)
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```([\w:/.-]+)?\n((?s:.*?))```").expect("valid fence pattern"))
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x00CODEBLOCK(\d+)\x00").expect("valid placeholder pattern"))
}

fn bold_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid emphasis pattern"))
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(https?://\S+)|([a-zA-Z0-9._-]+@[a-zA-Z0-9._-]+\.[a-zA-Z0-9._-]+)")
            .expect("valid link pattern")
    })
}

/// Escape `& < > " '` for safe inclusion in markup
///
/// # Examples
///
/// ```
/// use chatpane::render::escape_html;
///
/// assert_eq!(escape_html("<a href='x'>"), "&lt;a href=&#039;x&#039;&gt;");
/// ```
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of `escape_html`
pub fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Formatted bot response and the code blocks lifted out of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMessage {
    /// Final markup, code block fragments included
    pub markup: String,
    /// Code blocks in order of appearance
    pub code_blocks: Vec<CodeBlock>,
}

/// Replace each fenced region with a placeholder and collect the blocks
///
/// Fences without a closing marker are left as text.
pub fn extract_code_blocks(text: &str) -> (String, Vec<CodeBlock>) {
    let mut blocks = Vec::new();
    let replaced = fence_regex().replace_all(text, |caps: &Captures| {
        blocks.push(CodeBlock {
            language: caps.get(1).map(|m| m.as_str().to_string()),
            code: caps[2].trim().to_string(),
        });
        placeholder(blocks.len() - 1)
    });
    (replaced.into_owned(), blocks)
}

/// Full pipeline for bot responses
///
/// Code fences are extracted first so no later rule touches code. The
/// remaining text is escaped, `**bold**` becomes `<strong>`, blank lines
/// split paragraphs and single newlines become `<br>`. Placeholders are
/// finally replaced with self-contained code block fragments.
pub fn format_response(raw: &str) -> FormattedMessage {
    let text = raw.replace("\r\n", "\n").replace('\0', "");
    let (text, code_blocks) = extract_code_blocks(&text);

    let escaped = escape_html(&text);
    let bolded = bold_regex().replace_all(&escaped, "<strong>${1}</strong>");
    let mut markup = bolded.replace("\n\n", "</p><p>").replace('\n', "<br>");
    if !markup.starts_with("<p>") {
        markup = format!("<p>{}</p>", markup);
    }

    let markup = placeholder_regex()
        .replace_all(&markup, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| code_blocks.get(i))
                .map(CodeBlock::to_html)
                .unwrap_or_default()
        })
        .into_owned();

    FormattedMessage {
        markup,
        code_blocks,
    }
}

/// Light pipeline for user messages: escaped text, clickable links, `<br>`
///
/// URLs and email addresses are found in one pass, so an address inside
/// a URL stays part of that URL's link.
///
/// # Examples
///
/// ```
/// use chatpane::render::format_user;
///
/// let html = format_user("mail me@example.com");
/// assert_eq!(html, r#"mail <a href="mailto:me@example.com">me@example.com</a>"#);
/// ```
pub fn format_user(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n");
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in link_regex().captures_iter(&text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&escape_html(&text[last..whole.start()]));

        let target = escape_html(whole.as_str());
        if caps.get(1).is_some() {
            out.push_str(&format!(
                r#"<a href="{0}" target="_blank" rel="noopener noreferrer">{0}</a>"#,
                target
            ));
        } else {
            out.push_str(&format!(r#"<a href="mailto:{0}">{0}</a>"#, target));
        }
        last = whole.end();
    }
    out.push_str(&escape_html(&text[last..]));

    out.replace('\n', "<br>")
}

/// Reduce rendered markup to terminal-friendly text
///
/// Code blocks keep their body on separate lines, copy controls and
/// remaining tags are dropped, and entities are decoded.
pub fn plain_text(markup: &str) -> String {
    static BUTTON: OnceLock<Regex> = OnceLock::new();
    static CODE_HEADER: OnceLock<Regex> = OnceLock::new();
    static PRE: OnceLock<Regex> = OnceLock::new();
    static BR: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();

    let button = BUTTON.get_or_init(|| {
        Regex::new(r"(?s)<button[^>]*>.*?</button>").expect("valid button pattern")
    });
    let code_header = CODE_HEADER.get_or_init(|| {
        Regex::new(r#"(?s)<div class="code-header">.*?</div>"#).expect("valid header pattern")
    });
    let pre = PRE.get_or_init(|| Regex::new(r"<pre[^>]*>").expect("valid pre pattern"));
    let br = BR.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid br pattern"));
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));
    let blank_lines = BLANK_LINES
        .get_or_init(|| Regex::new(r"\n\s*\n\s*\n+").expect("valid whitespace pattern"));

    // Drop controls and code headers
    let result = button.replace_all(markup, "");
    let result = code_header.replace_all(&result, "");

    // Code bodies on their own lines
    let result = pre.replace_all(&result, "\n").replace("</pre>", "\n");

    // Paragraphs and line breaks
    let result = result.replace("</p><p>", "\n\n");
    let result = br.replace_all(&result, "\n");

    // Remove remaining tags
    let result = tag.replace_all(&result, "");
    let result = blank_lines.replace_all(&result, "\n\n");

    unescape_html(result.trim())
}

/// A message ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Whether the user wrote it
    pub is_user: bool,
    /// Complete markup
    pub markup: String,
    /// Code blocks to pass to the highlighting pass
    pub code_blocks: Vec<CodeBlock>,
    /// Attached image, shown below the text
    pub image: Option<ImageAttachment>,
}

impl RenderedMessage {
    /// Run `highlighter` over every code block, in order
    pub fn highlight(&self, highlighter: &dyn SyntaxHighlighter) -> Vec<String> {
        self.code_blocks
            .iter()
            .map(|block| highlighter.highlight(block))
            .collect()
    }

    /// Text content without markup
    pub fn plain_text(&self) -> String {
        plain_text(&self.markup)
    }
}

/// A fresh bot response waiting to be revealed
#[derive(Debug, Clone)]
pub struct PendingReveal {
    /// Step sequence over `message.markup`
    pub reveal: Reveal,
    /// The final state once the reveal completes
    pub message: RenderedMessage,
}

/// How a message should appear
#[derive(Debug, Clone)]
pub enum RenderJob {
    /// Show the complete markup at once
    Instant(RenderedMessage),
    /// Type the markup out, then highlight
    Animated(PendingReveal),
}

impl RenderJob {
    /// The message as it looks once fully shown
    pub fn message(&self) -> &RenderedMessage {
        match self {
            RenderJob::Instant(message) => message,
            RenderJob::Animated(pending) => &pending.message,
        }
    }

    /// Whether the job types out
    pub fn is_animated(&self) -> bool {
        matches!(self, RenderJob::Animated(_))
    }
}

/// Chooses the pipeline and reveal mode for each message
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    schedule: PhaseSchedule,
    animate: bool,
}

impl Renderer {
    /// Create a renderer that animates fresh bot responses with `schedule`
    pub fn new(schedule: PhaseSchedule) -> Self {
        Self {
            schedule,
            animate: true,
        }
    }

    /// Create a renderer that never animates
    pub fn instant() -> Self {
        Self {
            schedule: PhaseSchedule::instant(),
            animate: false,
        }
    }

    /// Enable or disable the typing effect
    pub fn with_animation(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }

    /// The reveal schedule in use
    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    /// Render a stored or freshly received message
    ///
    /// # Arguments
    ///
    /// * `message` - The message to render
    /// * `fresh` - True for a response just received; history renders instantly
    ///
    /// # Returns
    ///
    /// `None` when there is nothing to show (blank text and no image)
    ///
    /// # Examples
    ///
    /// ```
    /// use chatpane::render::{PhaseSchedule, Renderer};
    /// use chatpane::storage::Message;
    ///
    /// let renderer = Renderer::new(PhaseSchedule::default());
    /// assert!(renderer.render(&Message::bot("hi"), true).unwrap().is_animated());
    /// assert!(!renderer.render(&Message::bot("hi"), false).unwrap().is_animated());
    /// assert!(renderer.render(&Message::user("   "), true).is_none());
    /// ```
    pub fn render(&self, message: &Message, fresh: bool) -> Option<RenderJob> {
        let image = message.image_data.clone().map(ImageAttachment::new);
        if message.content.trim().is_empty() && image.is_none() {
            return None;
        }

        if message.is_user {
            return Some(RenderJob::Instant(RenderedMessage {
                is_user: true,
                markup: format_user(&message.content),
                code_blocks: Vec::new(),
                image,
            }));
        }

        let formatted = format_response(&message.content);
        let mut markup = formatted.markup;
        if let Some(attachment) = &image {
            markup.push_str(&attachment.to_html());
        }
        let rendered = RenderedMessage {
            is_user: false,
            markup,
            code_blocks: formatted.code_blocks,
            image,
        };

        if fresh && self.animate {
            Some(RenderJob::Animated(PendingReveal {
                reveal: Reveal::new(rendered.markup.clone(), self.schedule.clone()),
                message: rendered,
            }))
        } else {
            Some(RenderJob::Instant(rendered))
        }
    }

    /// Bot-style notice shown in place of a failed response
    pub fn notice(&self, text: &str) -> RenderedMessage {
        let formatted = format_response(text);
        RenderedMessage {
            is_user: false,
            markup: formatted.markup,
            code_blocks: formatted.code_blocks,
            image: None,
        }
    }
}
