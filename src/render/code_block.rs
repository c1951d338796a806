//! Fenced code block fragments and their copy control

use super::escape_html;
use std::time::{Duration, Instant};

/// Header label used when a fence carries no language tag
pub const DEFAULT_LANGUAGE_LABEL: &str = "code snippet";

/// Highlight class used when a fence carries no language tag
pub const FALLBACK_HIGHLIGHT_CLASS: &str = "javascript";

/// How long the copy control shows its confirmation
pub const COPY_CONFIRMATION: Duration = Duration::from_secs(2);

/// Class attribute that marks the root of a code block fragment
pub const CODE_BLOCK_MARKER: &str = r#"class="code-block""#;

const COPY_ICON: &str = r#"<svg width="14" height="14" viewBox="0 0 24 24" fill="none" stroke="currentColor"><rect x="9" y="9" width="13" height="13" rx="2" stroke-width="2"/><path d="M5 15H4a2 2 0 0 1-2-2V4a2 2 0 0 1 2-2h9a2 2 0 0 1 2 2v1" stroke-width="2"/></svg>"#;

const CHECK_ICON: &str = r#"<svg stroke="currentColor" fill="none" stroke-width="2" viewBox="0 0 24 24" height="1em" width="1em"><polyline points="20 6 9 17 4 12"></polyline></svg>"#;

/// A fenced code region pulled out of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Language tag from the fence, if any
    pub language: Option<String>,
    /// Code body with surrounding whitespace trimmed, unescaped
    pub code: String,
}

impl CodeBlock {
    /// Label shown in the block header
    pub fn label(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE_LABEL)
    }

    /// Lower-cased syntax highlight class, `javascript` when untagged
    pub fn highlight_class(&self) -> String {
        match self.language.as_deref() {
            Some(lang) if !lang.is_empty() => lang.to_lowercase(),
            _ => FALLBACK_HIGHLIGHT_CLASS.to_string(),
        }
    }

    /// Self-contained markup for the block: header, escaped body and copy control
    ///
    /// The fragment has no whitespace between tags so the reveal can lift it
    /// out as one subtree.
    pub fn to_html(&self) -> String {
        format!(
            concat!(
                r#"<div class="code-block">"#,
                r#"<div class="code-header"><span class="code-language">{label}</span></div>"#,
                r#"<div class="code-content">"#,
                r#"<pre><code class="language-{class}">{code}</code></pre>"#,
                "{button}",
                "</div></div>"
            ),
            label = escape_html(self.label()),
            class = escape_html(&self.highlight_class()),
            code = escape_html(&self.code),
            button = CopyButton::new().to_html(Instant::now()),
        )
    }
}

/// Copy-to-clipboard control that confirms for two seconds after a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyButton {
    copied_at: Option<Instant>,
}

impl CopyButton {
    /// A button in its resting state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful copy at `now`
    pub fn mark_copied(&mut self, now: Instant) {
        self.copied_at = Some(now);
    }

    /// Whether the confirmation is showing at `now`
    pub fn is_confirming(&self, now: Instant) -> bool {
        self.copied_at
            .map(|at| now.saturating_duration_since(at) < COPY_CONFIRMATION)
            .unwrap_or(false)
    }

    /// Drop an expired confirmation; returns true when the label reverted
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.copied_at.is_some() && !self.is_confirming(now) {
            self.copied_at = None;
            return true;
        }
        false
    }

    /// Button label at `now`
    pub fn label(&self, now: Instant) -> &'static str {
        if self.is_confirming(now) {
            "Copied!"
        } else {
            "Copy"
        }
    }

    /// Button markup at `now`
    pub fn to_html(&self, now: Instant) -> String {
        if self.is_confirming(now) {
            format!(
                r#"<button class="code-copy-btn copied">{} {}</button>"#,
                CHECK_ICON,
                self.label(now)
            )
        } else {
            format!(
                r#"<button class="code-copy-btn">{} {}</button>"#,
                COPY_ICON,
                self.label(now)
            )
        }
    }
}

/// Highlighting pass applied to code blocks once a message is fully shown
pub trait SyntaxHighlighter {
    /// Produce the highlighted form of `block` for the presentation layer
    fn highlight(&self, block: &CodeBlock) -> String;
}
