//! Phased, tag-aware reveal of formatted markup
//!
//! A `Reveal` walks formatted markup and yields one `RevealStep` per visible
//! character. Tags are never split: they ride along with the next visible
//! character. Code block and image subtrees are emitted whole in a single
//! step with no pause. The caller decides how to wait between steps, which keeps this
//! module free of timers; `Reveal::into_stream` is the stock async driver.

use super::code_block::CODE_BLOCK_MARKER;
use super::image::IMAGE_BLOCK_MARKER;
use futures::Stream;
use std::time::Duration;

/// One speed band of the reveal schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    /// Band applies while fewer than this many characters have been revealed
    pub threshold: usize,
    /// Pause after each character in this band
    pub delay: Duration,
}

/// Per-character pause as a function of characters revealed so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSchedule {
    phases: Vec<Phase>,
    final_delay: Duration,
}

impl Default for PhaseSchedule {
    fn default() -> Self {
        Self::new(
            vec![
                Phase {
                    threshold: 15,
                    delay: Duration::from_millis(60),
                },
                Phase {
                    threshold: 25,
                    delay: Duration::from_millis(30),
                },
                Phase {
                    threshold: 40,
                    delay: Duration::from_millis(15),
                },
                Phase {
                    threshold: 60,
                    delay: Duration::from_millis(5),
                },
            ],
            Duration::from_millis(2),
        )
    }
}

impl PhaseSchedule {
    /// Build a schedule; `phases` must be ordered by ascending threshold
    pub fn new(phases: Vec<Phase>, final_delay: Duration) -> Self {
        Self {
            phases,
            final_delay,
        }
    }

    /// A schedule with no pauses at all
    pub fn instant() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }

    /// Pause after the `revealed`-th visible character (1-based)
    ///
    /// # Examples
    ///
    /// ```
    /// use chatpane::render::PhaseSchedule;
    /// use std::time::Duration;
    ///
    /// let schedule = PhaseSchedule::default();
    /// assert_eq!(schedule.delay_after(1), Duration::from_millis(60));
    /// assert_eq!(schedule.delay_after(15), Duration::from_millis(30));
    /// assert_eq!(schedule.delay_after(500), Duration::from_millis(2));
    /// ```
    pub fn delay_after(&self, revealed: usize) -> Duration {
        self.phases
            .iter()
            .find(|phase| revealed < phase.threshold)
            .map(|phase| phase.delay)
            .unwrap_or(self.final_delay)
    }
}

/// What a reveal step carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// One visible character (or entity), preceded by any pending tags
    Text,
    /// A whole code block subtree; `index` counts code blocks in order of appearance
    CodeBlock {
        /// Position of the block among the message's code blocks
        index: usize,
    },
    /// A whole image block subtree
    Image,
    /// Tags left over after the last visible character
    Trailing,
}

/// One unit of progress: show `fragment`, then wait `delay`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealStep {
    /// Markup appended to the display by this step
    pub fragment: String,
    /// Kind of content in `fragment`
    pub kind: StepKind,
    /// Pause before the next step
    pub delay: Duration,
}

/// Scanner state between characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Text,
    InTag { start: usize },
}

/// Lazy sequence of reveal steps over formatted markup
///
/// Dropping a `Reveal` abandons it; nothing needs to be undone.
#[derive(Debug, Clone)]
pub struct Reveal {
    markup: String,
    pos: usize,
    revealed: String,
    visible_chars: usize,
    code_blocks: usize,
    schedule: PhaseSchedule,
}

impl Reveal {
    /// Start revealing `markup` with `schedule`
    pub fn new(markup: impl Into<String>, schedule: PhaseSchedule) -> Self {
        Self {
            markup: markup.into(),
            pos: 0,
            revealed: String::new(),
            visible_chars: 0,
            code_blocks: 0,
            schedule,
        }
    }

    /// Markup shown so far
    pub fn revealed(&self) -> &str {
        &self.revealed
    }

    /// Number of visible characters shown so far
    pub fn visible_chars(&self) -> usize {
        self.visible_chars
    }

    /// True once every byte of the markup has been emitted
    pub fn is_finished(&self) -> bool {
        self.pos >= self.markup.len()
    }

    /// Skip the animation and return the complete markup
    pub fn finish(self) -> String {
        self.markup
    }

    /// Drive the reveal with real pauses between steps
    ///
    /// Each step is yielded immediately; its delay elapses before the next
    /// one is produced.
    pub fn into_stream(self) -> impl Stream<Item = RevealStep> {
        futures::stream::unfold(
            (self, Duration::ZERO),
            |(mut reveal, wait)| async move {
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                let step = reveal.next()?;
                let delay = step.delay;
                Some((step, (reveal, delay)))
            },
        )
    }

    fn emit(&mut self, fragment: String, kind: StepKind, delay: Duration) -> RevealStep {
        self.revealed.push_str(&fragment);
        RevealStep {
            fragment,
            kind,
            delay,
        }
    }
}

impl Iterator for Reveal {
    type Item = RevealStep;

    fn next(&mut self) -> Option<RevealStep> {
        let mut pending = String::new();
        let mut state = ScanState::Text;

        while self.pos < self.markup.len() {
            let rest = &self.markup[self.pos..];
            let Some(c) = rest.chars().next() else {
                break;
            };

            match state {
                ScanState::Text if c == '<' => {
                    state = ScanState::InTag { start: self.pos };
                    self.pos += 1;
                }
                ScanState::Text => {
                    let unit = entity_len(rest).unwrap_or_else(|| c.len_utf8());
                    pending.push_str(&rest[..unit]);
                    self.pos += unit;
                    self.visible_chars += 1;
                    let delay = self.schedule.delay_after(self.visible_chars);
                    return Some(self.emit(pending, StepKind::Text, delay));
                }
                ScanState::InTag { start } => {
                    self.pos += c.len_utf8();
                    if c != '>' {
                        continue;
                    }
                    state = ScanState::Text;
                    let tag = &self.markup[start..self.pos];
                    pending.push_str(tag);

                    if tag.starts_with("</") {
                        continue;
                    }
                    let is_code = tag.contains(CODE_BLOCK_MARKER);
                    if !is_code && !tag.contains(IMAGE_BLOCK_MARKER) {
                        continue;
                    }
                    if let Some(len) = subtree_len(&self.markup[self.pos..]) {
                        pending.push_str(&self.markup[self.pos..self.pos + len]);
                        self.pos += len;
                        let kind = if is_code {
                            let index = self.code_blocks;
                            self.code_blocks += 1;
                            StepKind::CodeBlock { index }
                        } else {
                            StepKind::Image
                        };
                        return Some(self.emit(pending, kind, Duration::ZERO));
                    }
                }
            }
        }

        // an unterminated tag runs to the end of input and is flushed as-is
        if let ScanState::InTag { start } = state {
            pending.push_str(&self.markup[start..]);
        }

        if pending.is_empty() {
            None
        } else {
            Some(self.emit(pending, StepKind::Trailing, Duration::ZERO))
        }
    }
}

/// Length of an HTML entity at the start of `text`, if there is one
fn entity_len(text: &str) -> Option<usize> {
    if !text.starts_with('&') {
        return None;
    }
    let end = text.char_indices().take(10).find(|(_, c)| *c == ';')?.0;
    let body = &text[1..end];
    if !body.is_empty() && body.chars().all(|c| c.is_ascii_alphanumeric() || c == '#') {
        Some(end + 1)
    } else {
        None
    }
}

/// Length of the remainder of a `<div>` subtree whose opening tag was just consumed
fn subtree_len(rest: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = 0;
    while i < rest.len() {
        let tail = &rest[i..];
        if tail.starts_with("</div>") {
            depth -= 1;
            i += "</div>".len();
            if depth == 0 {
                return Some(i);
            }
        } else if tail.starts_with("<div") && matches!(tail[4..].chars().next(), Some(' ' | '>')) {
            depth += 1;
            i += "<div".len();
        } else {
            i += tail.chars().next().map(char::len_utf8).unwrap_or(1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(markup: &str) -> Vec<RevealStep> {
        Reveal::new(markup, PhaseSchedule::default()).collect()
    }

    #[test]
    fn test_schedule_phase_boundaries() {
        let s = PhaseSchedule::default();
        let ms = |n| s.delay_after(n).as_millis();
        assert_eq!(ms(14), 60);
        assert_eq!(ms(15), 30);
        assert_eq!(ms(24), 30);
        assert_eq!(ms(25), 15);
        assert_eq!(ms(39), 15);
        assert_eq!(ms(40), 5);
        assert_eq!(ms(59), 5);
        assert_eq!(ms(60), 2);
    }

    #[test]
    fn test_tags_ride_with_next_character() {
        let steps = steps("<p>ab</p>");
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].fragment, "<p>a");
        assert_eq!(steps[1].fragment, "b");
        assert_eq!(steps[2].fragment, "</p>");
        assert_eq!(steps[2].kind, StepKind::Trailing);
        assert_eq!(steps[2].delay, Duration::ZERO);
    }

    #[test]
    fn test_concatenated_fragments_equal_input() {
        let markup = "<p>Hi <strong>there</strong>&amp; you<br>ok</p>";
        let joined: String = steps(markup).into_iter().map(|s| s.fragment).collect();
        assert_eq!(joined, markup);
    }

    #[test]
    fn test_entities_count_as_one_character() {
        let steps = steps("a&amp;b");
        let fragments: Vec<&str> = steps.iter().map(|s| s.fragment.as_str()).collect();
        assert_eq!(fragments, vec!["a", "&amp;", "b"]);
    }

    #[test]
    fn test_lone_ampersand_is_plain_text() {
        let fragments: Vec<String> = steps("a & b").into_iter().map(|s| s.fragment).collect();
        assert_eq!(fragments, vec!["a", " ", "&", " ", "b"]);
    }

    #[test]
    fn test_code_block_is_atomic_and_free() {
        let markup = concat!(
            "<p>x",
            r#"<div class="code-block"><div class="code-header">py</div>"#,
            "<div><pre>print(1)</pre></div></div>",
            "y</p>"
        );
        let steps = steps(markup);
        assert_eq!(steps[0].fragment, "<p>x");
        assert_eq!(steps[1].kind, StepKind::CodeBlock { index: 0 });
        assert!(steps[1].fragment.ends_with("</div></div>"));
        assert!(steps[1].fragment.contains("print(1)"));
        assert_eq!(steps[1].delay, Duration::ZERO);
        assert_eq!(steps[2].fragment, "y");
        assert_eq!(steps[2].kind, StepKind::Text);
    }

    #[test]
    fn test_unterminated_code_block_falls_back_to_characters() {
        let markup = r#"<div class="code-block"><div>ab"#;
        let steps = steps(markup);
        assert!(steps.iter().all(|s| s.kind == StepKind::Text));
        let joined: String = steps.iter().map(|s| s.fragment.as_str()).collect();
        assert_eq!(joined, markup);
    }

    #[test]
    fn test_unmatched_open_tag_is_flushed_as_is() {
        let steps = steps("ab<strong class=\"x\"");
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].fragment, "<strong class=\"x\"");
        assert_eq!(steps[2].kind, StepKind::Trailing);
    }

    #[test]
    fn test_multibyte_characters_are_single_steps() {
        let fragments: Vec<String> = steps("héllo 👋").into_iter().map(|s| s.fragment).collect();
        assert_eq!(fragments.len(), 7);
        assert_eq!(fragments[1], "é");
        assert_eq!(fragments[6], "👋");
    }

    #[test]
    fn test_empty_markup_has_no_steps() {
        assert!(steps("").is_empty());
    }

    #[test]
    fn test_revealed_accumulates_and_finish_returns_all() {
        let mut reveal = Reveal::new("<p>abc</p>", PhaseSchedule::instant());
        reveal.next();
        assert_eq!(reveal.revealed(), "<p>a");
        assert_eq!(reveal.visible_chars(), 1);
        assert!(!reveal.is_finished());
        assert_eq!(reveal.finish(), "<p>abc</p>");
    }

    #[test]
    fn test_subtree_len_ignores_lookalike_tags() {
        let rest = "<divider></divider></div>tail";
        assert_eq!(subtree_len(rest), Some(rest.len() - "tail".len()));
        assert_eq!(subtree_len("<div>"), None);
    }

    #[tokio::test]
    async fn test_stream_yields_all_steps() {
        use futures::StreamExt;

        let reveal = Reveal::new("<p>ok</p>", PhaseSchedule::instant());
        let collected: Vec<RevealStep> = reveal.into_stream().collect().await;
        let joined: String = collected.iter().map(|s| s.fragment.as_str()).collect();
        assert_eq!(joined, "<p>ok</p>");
    }
}
