use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message as persisted
///
/// `content` is the raw text as sent or received, before any formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Raw message text
    pub content: String,
    /// True when authored by the end user
    pub is_user: bool,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Base64 image payload attached to the message, if any
    #[serde(default)]
    pub image_data: Option<String>,
}

impl Message {
    /// Create a user-authored message stamped now
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_user: true,
            timestamp: Utc::now(),
            image_data: None,
        }
    }

    /// Create a responder message stamped now
    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_user: false,
            timestamp: Utc::now(),
            image_data: None,
        }
    }

    /// Attach a base64 image payload
    pub fn with_image(mut self, image_data: impl Into<String>) -> Self {
        self.image_data = Some(image_data.into());
        self
    }
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique identifier (`chat_<ULID>`)
    pub id: String,
    /// Display label
    pub title: String,
    /// Messages in insertion order
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Whether the chat is hidden from the active list
    #[serde(default)]
    pub archived: bool,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

/// Lightweight view of a chat for history listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Chat identifier
    pub id: String,
    /// Display label
    pub title: String,
    /// Archive flag
    pub archived: bool,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Number of messages in the chat
    pub message_count: usize,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            archived: chat.archived,
            timestamp: chat.timestamp,
            message_count: chat.messages.len(),
        }
    }
}

/// Which side of the archive flag a listing shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFilter {
    /// Chats that are not archived
    Active,
    /// Archived chats only
    Archived,
}

impl ChatFilter {
    /// Whether `chat` belongs to this side of the filter
    pub fn matches(&self, chat: &Chat) -> bool {
        match self {
            Self::Active => !chat.archived,
            Self::Archived => chat.archived,
        }
    }
}

/// One window of a chat's messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Messages in this window, in display order
    pub messages: Vec<Message>,
    /// True when more messages follow this window
    pub has_more: bool,
}

/// User preferences persisted next to the chat collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Dark theme flag
    #[serde(default)]
    pub dark_mode: bool,
    /// Key for the chat endpoint
    #[serde(default)]
    pub api_key: Option<String>,
    /// Key for the image generation service (`hf_` prefixed)
    #[serde(default)]
    pub hf_api_key: Option<String>,
}
