//! Session state and orchestration
//!
//! A `ChatSession` ties the history store, the chat backend and the
//! renderer together. It owns the UI toggles (theme, archived view) and
//! drives an explicit state machine:
//!
//! ```text
//! Idle --Submit--> Sending --RequestSent--> AwaitingResponse
//!   ^                 |                          |
//!   |               Failed              ResponseReceived / Failed
//!   |                 v                          v
//!   +------------- Idle <---RevealComplete--- Rendering
//! ```
//!
//! The focused chat is always read from the store; the session keeps no
//! copy of it.

use crate::client::{ChatBackend, ChatRequest, GENERIC_FAILURE};
use crate::error::{ChatpaneError, Result};
use crate::history::HistoryStore;
use crate::render::{RenderJob, RenderedMessage, Renderer};
use crate::storage::{ChatFilter, ChatSummary, KeyValueStore, Message};
use colored::Colorize;
use std::fmt;

/// Longest title accepted when relabelling a chat
pub const MAX_TITLE_CHARS: usize = 30;

/// Shown when a message is submitted without a chat key
pub const MISSING_API_KEY: &str = "Please set your API key in settings";

/// Color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    /// Light background
    #[default]
    Light,
    /// Dark background
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "LIGHT"),
            Self::Dark => write!(f, "DARK"),
        }
    }
}

impl Theme {
    /// Parse a theme from a string
    ///
    /// # Examples
    ///
    /// ```
    /// use chatpane::session::Theme;
    ///
    /// assert_eq!(Theme::parse_str("Dark").unwrap(), Theme::Dark);
    /// assert!(Theme::parse_str("sepia").is_err());
    /// ```
    pub fn parse_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(format!("Unknown theme: {}", other)),
        }
    }

    /// Theme stored as the `darkMode` preference flag
    pub fn from_dark_mode(dark_mode: bool) -> Self {
        if dark_mode {
            Self::Dark
        } else {
            Self::Light
        }
    }

    /// Whether this is the dark theme
    pub fn is_dark(&self) -> bool {
        matches!(self, Self::Dark)
    }

    /// The other theme
    pub fn toggled(&self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    /// Short description for status output
    pub fn description(&self) -> &'static str {
        match self {
            Self::Light => "Light background, dark text",
            Self::Dark => "Dark background, light text",
        }
    }

    /// Colored tag for terminal output
    pub fn colored_tag(&self) -> String {
        match self {
            Self::Light => format!("[{}]", "LIGHT".yellow()),
            Self::Dark => format!("[{}]", "DARK".blue()),
        }
    }
}

/// Which side of the archive flag the history list shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryView {
    /// Chats that are not archived
    #[default]
    Active,
    /// Archived chats
    Archived,
}

impl fmt::Display for HistoryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Archived => write!(f, "ARCHIVED"),
        }
    }
}

impl HistoryView {
    /// Store filter for this view
    pub fn filter(&self) -> ChatFilter {
        match self {
            Self::Active => ChatFilter::Active,
            Self::Archived => ChatFilter::Archived,
        }
    }

    /// The other view
    pub fn toggled(&self) -> Self {
        match self {
            Self::Active => Self::Archived,
            Self::Archived => Self::Active,
        }
    }

    /// Label of the control that switches away from this view
    pub fn toggle_label(&self) -> &'static str {
        match self {
            Self::Active => "Show archived chats",
            Self::Archived => "Show active chats",
        }
    }
}

/// Where the session is in the send/render cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Ready for input
    #[default]
    Idle,
    /// User message accepted, request being built
    Sending,
    /// Request in flight
    AwaitingResponse,
    /// Response being revealed
    Rendering,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Sending => write!(f, "sending"),
            Self::AwaitingResponse => write!(f, "awaiting response"),
            Self::Rendering => write!(f, "rendering"),
        }
    }
}

/// Trigger for a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The user submitted a message
    Submit,
    /// The request left the client
    RequestSent,
    /// A successful reply arrived
    ResponseReceived,
    /// The reply is fully shown
    RevealComplete,
    /// The request failed
    Failed,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submit => write!(f, "submit"),
            Self::RequestSent => write!(f, "request sent"),
            Self::ResponseReceived => write!(f, "response received"),
            Self::RevealComplete => write!(f, "reveal complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl SessionState {
    /// Apply `event`
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::InvalidTransition` when `event` is not valid in this state
    ///
    /// # Examples
    ///
    /// ```
    /// use chatpane::session::{SessionEvent, SessionState};
    ///
    /// let state = SessionState::Idle.transition(SessionEvent::Submit).unwrap();
    /// assert_eq!(state, SessionState::Sending);
    /// assert!(state.transition(SessionEvent::Submit).is_err());
    /// ```
    pub fn transition(self, event: SessionEvent) -> Result<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (Idle, Submit) => Ok(Sending),
            (Sending, RequestSent) => Ok(AwaitingResponse),
            (AwaitingResponse, ResponseReceived) => Ok(Rendering),
            (Rendering, RevealComplete) => Ok(Idle),
            (Sending | AwaitingResponse, Failed) => Ok(Idle),
            (from, event) => Err(ChatpaneError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            }
            .into()),
        }
    }

    /// Whether a new message may be submitted
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Result of `ChatSession::submit`
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Blank input; nothing was sent or stored
    Ignored,
    /// The server answered
    Replied {
        /// Chat the exchange was stored in, if the write succeeded
        chat_id: Option<String>,
        /// The user's message, rendered
        user: RenderedMessage,
        /// The response; `None` when the reply carried no text or image
        response: Option<RenderJob>,
    },
    /// The request failed; the notice is shown but not stored
    Failed {
        /// Chat the user message was stored in, if the write succeeded
        chat_id: Option<String>,
        /// The user's message, rendered
        user: RenderedMessage,
        /// Bot-style error notice
        notice: RenderedMessage,
    },
}

/// User-facing outcome of a history action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    /// Toast text
    pub toast: String,
    /// The focused chat went away and the message area must be cleared
    pub reset_display: bool,
}

impl Feedback {
    fn toast(text: impl Into<String>) -> Self {
        Self {
            toast: text.into(),
            reset_display: false,
        }
    }
}

/// One page of a chat, rendered
#[derive(Debug, Clone)]
pub struct ChatView {
    /// Chat id
    pub chat_id: String,
    /// Chat title
    pub title: String,
    /// Page number shown (from 1)
    pub page: usize,
    /// Messages on this page
    pub messages: Vec<RenderedMessage>,
    /// Whether further pages exist
    pub has_more: bool,
}

/// Outcome of saving settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsOutcome {
    /// Whether the keys were stored
    pub saved: bool,
    /// Toast text
    pub message: String,
}

/// Text shown for a failed request
pub fn failure_message(err: &anyhow::Error) -> String {
    let message = match err.downcast_ref::<ChatpaneError>() {
        Some(ChatpaneError::Request(detail)) => detail.clone(),
        _ => err.to_string(),
    };
    if message.trim().is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        message
    }
}

/// Session context: store, backend, renderer and UI toggles
pub struct ChatSession<B: ChatBackend, S: KeyValueStore> {
    history: HistoryStore<S>,
    backend: B,
    renderer: Renderer,
    state: SessionState,
    theme: Theme,
    view: HistoryView,
    page: usize,
}

impl<B: ChatBackend, S: KeyValueStore> ChatSession<B, S> {
    /// Create a session; the theme is restored from stored preferences
    pub fn new(history: HistoryStore<S>, backend: B, renderer: Renderer) -> Self {
        let theme = Theme::from_dark_mode(history.preferences().dark_mode);
        Self {
            history,
            backend,
            renderer,
            state: SessionState::Idle,
            theme,
            view: HistoryView::Active,
            page: 1,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current theme
    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Current history view
    pub fn view(&self) -> HistoryView {
        self.view
    }

    /// The underlying store
    pub fn history(&self) -> &HistoryStore<S> {
        &self.history
    }

    /// The renderer in use
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// The backend in use
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Focused chat id, read from the store
    pub fn current_chat_id(&self) -> Option<String> {
        self.history.current_chat_id()
    }

    fn apply(&mut self, event: SessionEvent) -> Result<()> {
        let next = self.state.transition(event)?;
        tracing::debug!("Session {} -> {} on {}", self.state, next, event);
        self.state = next;
        Ok(())
    }

    /// Append to the focused chat, starting a new one if focus is gone
    fn store_message(&self, message: Message) -> Option<String> {
        let current = self.history.current_chat_id();
        match self.history.append(current.as_deref(), message.clone()) {
            Some(id) => Some(id),
            None if current.is_some() => {
                tracing::warn!("Focused chat is gone, starting a new chat");
                self.history.append(None, message)
            }
            None => None,
        }
    }

    fn render_instant(&self, message: &Message) -> Option<RenderedMessage> {
        self.renderer
            .render(message, false)
            .map(|job| job.message().clone())
    }

    /// Send a message and return what to display
    ///
    /// The user message is stored before the request goes out. A reply is
    /// stored as soon as it arrives; an animated reply leaves the session in
    /// `Rendering` until `reveal_complete` is called.
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::MissingCredentials` when no chat key is
    /// stored and `ChatpaneError::Busy` when a message is already in
    /// flight or being revealed.
    pub async fn submit(&mut self, input: &str) -> Result<SubmitOutcome> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        let preferences = self.history.preferences();
        let Some(api_key) = preferences.api_key.filter(|k| !k.trim().is_empty()) else {
            return Err(ChatpaneError::MissingCredentials(MISSING_API_KEY.to_string()).into());
        };

        if !self.state.accepts_input() {
            return Err(ChatpaneError::Busy.into());
        }
        self.apply(SessionEvent::Submit)?;

        let user_message = Message::user(text);
        let user = self
            .render_instant(&user_message)
            .unwrap_or_else(|| self.renderer.notice(text));
        let mut chat_id = self.store_message(user_message);
        if chat_id.is_none() {
            tracing::error!("Failed to store user message");
        }

        let request = ChatRequest {
            message: text.to_string(),
            api_key,
            hf_api_key: preferences.hf_api_key.unwrap_or_default(),
        };
        self.apply(SessionEvent::RequestSent)?;

        let reply = match self.backend.send(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Chat request failed: {}", e);
                self.apply(SessionEvent::Failed)?;
                return Ok(SubmitOutcome::Failed {
                    chat_id,
                    user,
                    notice: self.renderer.notice(&failure_message(&e)),
                });
            }
        };
        self.apply(SessionEvent::ResponseReceived)?;

        let response = match reply.response.filter(|r| !r.trim().is_empty()) {
            Some(text) => {
                let mut bot = Message::bot(text);
                if let Some(image) = reply.image.filter(|i| !i.is_empty()) {
                    bot = bot.with_image(image);
                }
                match &chat_id {
                    Some(id) => {
                        if self.history.append(Some(id), bot.clone()).is_none() {
                            tracing::error!("Failed to store response in chat {}", id);
                        }
                    }
                    None => chat_id = self.store_message(bot.clone()),
                }
                self.renderer.render(&bot, true)
            }
            None => None,
        };

        if !matches!(response, Some(RenderJob::Animated(_))) {
            self.apply(SessionEvent::RevealComplete)?;
        }

        Ok(SubmitOutcome::Replied {
            chat_id,
            user,
            response,
        })
    }

    /// Mark the in-flight reveal as finished
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::InvalidTransition` when nothing is being revealed
    pub fn reveal_complete(&mut self) -> Result<()> {
        self.apply(SessionEvent::RevealComplete)
    }

    /// Drop an in-flight reveal, e.g. on navigation
    fn abandon_reveal(&mut self) {
        if self.state == SessionState::Rendering {
            tracing::debug!("Abandoning in-flight reveal");
            self.state = SessionState::Idle;
        }
    }

    fn view_page(&self, chat_id: &str, page: usize) -> Option<ChatView> {
        let chat = self.history.get(chat_id)?;
        let window = self.history.page(chat_id, page)?;
        Some(ChatView {
            chat_id: chat.id,
            title: chat.title,
            page,
            messages: window
                .messages
                .iter()
                .filter_map(|m| self.render_instant(m))
                .collect(),
            has_more: window.has_more,
        })
    }

    /// Focus a chat and show its first page, rendered instantly
    pub fn open_chat(&mut self, chat_id: &str) -> Option<ChatView> {
        self.abandon_reveal();
        let view = self.view_page(chat_id, 1)?;
        if !self.history.set_current_chat(Some(chat_id)) {
            tracing::warn!("Could not persist focus on chat {}", chat_id);
        }
        self.page = 1;
        Some(view)
    }

    /// Show the next page of the focused chat
    pub fn next_page(&mut self) -> Option<ChatView> {
        let chat_id = self.history.current_chat_id()?;
        let view = self.view_page(&chat_id, self.page + 1)?;
        if view.messages.is_empty() {
            return None;
        }
        self.page += 1;
        Some(view)
    }

    /// Clear focus so the next message starts a new chat
    pub fn new_chat(&mut self) -> bool {
        self.abandon_reveal();
        self.page = 1;
        self.history.set_current_chat(None)
    }

    /// Chats in the current history view
    pub fn chats(&self) -> Vec<ChatSummary> {
        self.history.list(self.view.filter())
    }

    /// Switch between active and archived chats
    pub fn toggle_history_view(&mut self) -> HistoryView {
        self.view = self.view.toggled();
        self.view
    }

    /// Flip the theme and persist it
    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        let mut preferences = self.history.preferences();
        preferences.dark_mode = self.theme.is_dark();
        if !self.history.save_preferences(&preferences) {
            tracing::warn!("Theme changed but could not be saved");
        }
        self.theme
    }

    /// Archive or unarchive a chat
    pub fn toggle_archive(&mut self, chat_id: &str) -> Option<Feedback> {
        let was_focused = self.current_chat_id().as_deref() == Some(chat_id);
        let archived = self.history.toggle_archive(chat_id)?;
        let reset_display = was_focused && self.current_chat_id().is_none();
        if reset_display {
            self.abandon_reveal();
        }
        Some(Feedback {
            toast: if archived {
                "Chat archived"
            } else {
                "Chat unarchived"
            }
            .to_string(),
            reset_display,
        })
    }

    /// Rename a chat, keeping at most `MAX_TITLE_CHARS` characters
    pub fn relabel(&mut self, chat_id: &str, title: &str) -> Option<Feedback> {
        let title: String = title.trim().chars().take(MAX_TITLE_CHARS).collect();
        self.history
            .relabel(chat_id, &title)
            .then(|| Feedback::toast("Chat label updated"))
    }

    /// Delete a chat
    pub fn delete_chat(&mut self, chat_id: &str) -> Option<Feedback> {
        let was_focused = self.current_chat_id().as_deref() == Some(chat_id);
        if !self.history.delete(chat_id) {
            return None;
        }
        if was_focused {
            self.abandon_reveal();
        }
        Some(Feedback {
            toast: "Chat deleted".to_string(),
            reset_display: was_focused,
        })
    }

    /// Remove every chat
    pub fn clear_all(&mut self) -> Option<Feedback> {
        if !self.history.clear_all() {
            return None;
        }
        self.abandon_reveal();
        self.page = 1;
        Some(Feedback {
            toast: "All conversations cleared".to_string(),
            reset_display: true,
        })
    }

    /// Replace the history with an exported snapshot
    pub fn import(&mut self, snapshot: &str) -> Feedback {
        match self.history.import(snapshot) {
            Ok(_) => Feedback {
                toast: "Chat history imported successfully".to_string(),
                reset_display: self.current_chat_id().is_none(),
            },
            Err(e) => {
                tracing::warn!("Import failed: {}", e);
                Feedback::toast("Error importing chat history")
            }
        }
    }

    /// Remove an image from the focused chat's stored messages
    pub fn delete_image(&mut self, image_data: &str) -> Option<usize> {
        let chat_id = self.history.current_chat_id()?;
        self.history.clear_image(&chat_id, image_data)
    }

    /// Verify and store API keys
    ///
    /// Blank inputs are skipped. Each provided key is verified with the
    /// server first; nothing is stored unless every provided key passes.
    pub async fn save_settings(&mut self, api_key: &str, hf_api_key: &str) -> SettingsOutcome {
        let api_key = api_key.trim();
        let hf_api_key = hf_api_key.trim();

        if !api_key.is_empty() {
            let result = self.backend.verify_gemini_key(api_key).await;
            if !result.valid {
                return SettingsOutcome {
                    saved: false,
                    message: result.message,
                };
            }
        }

        if !hf_api_key.is_empty() {
            let result = self.backend.verify_hf_key(hf_api_key).await;
            if !result.valid {
                return SettingsOutcome {
                    saved: false,
                    message: result.message,
                };
            }
        }

        let mut preferences = self.history.preferences();
        if !api_key.is_empty() {
            preferences.api_key = Some(api_key.to_string());
        }
        if !hf_api_key.is_empty() {
            preferences.hf_api_key = Some(hf_api_key.to_string());
        }

        if self.history.save_preferences(&preferences) {
            SettingsOutcome {
                saved: true,
                message: "Settings saved successfully!".to_string(),
            }
        } else {
            SettingsOutcome {
                saved: false,
                message: "Failed to save settings".to_string(),
            }
        }
    }
}
