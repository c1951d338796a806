//! Chat history persistence
//!
//! `HistoryStore` keeps the whole chat collection as one serialized,
//! newest-first list under a single key, plus the focused chat id and user
//! preferences under their own keys. Every operation reads the collection,
//! mutates it in memory and writes it back in one `set`, so a failed write
//! leaves the previously persisted collection untouched.
//!
//! Operations never return errors to the caller. Corrupt stored data reads
//! as an empty collection and write failures are reported as `false` or
//! `None`; the details go to the log.

use crate::error::{ChatpaneError, Result};
use crate::storage::{
    Chat, ChatFilter, ChatSummary, HistoryPage, KeyValueStore, Message, Preferences, CHATS_KEY,
    CURRENT_CHAT_KEY, PREFERENCES_KEY,
};
use chrono::Utc;
use ulid::Ulid;

/// Default number of messages per history page
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Default number of chats dropped when the store runs out of space
pub const DEFAULT_EVICTION_BATCH: usize = 10;

/// Tunables for `HistoryStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistorySettings {
    /// Messages per page returned by `page`
    pub page_size: usize,
    /// Chats evicted from the tail when a write exceeds the quota
    pub eviction_batch: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            eviction_batch: DEFAULT_EVICTION_BATCH,
        }
    }
}

/// Generate a new time-based chat id
pub fn new_chat_id() -> String {
    format!("chat_{}", Ulid::new())
}

/// Derive a chat title from its first message: the first two words plus `...`
///
/// # Examples
///
/// ```
/// use chatpane::history::derive_title;
///
/// assert_eq!(derive_title("Hello world how are you"), "Hello world...");
/// assert_eq!(derive_title("Hi"), "Hi...");
/// ```
pub fn derive_title(content: &str) -> String {
    let words: Vec<&str> = content.split(' ').take(2).collect();
    format!("{}...", words.join(" "))
}

fn is_quota_exceeded(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ChatpaneError>(),
        Some(ChatpaneError::QuotaExceeded { .. })
    )
}

/// Persistent, newest-first chat collection
pub struct HistoryStore<S: KeyValueStore> {
    kv: S,
    settings: HistorySettings,
}

impl<S: KeyValueStore> HistoryStore<S> {
    /// Create a store with default settings
    pub fn new(kv: S) -> Self {
        Self::with_settings(kv, HistorySettings::default())
    }

    /// Create a store with explicit settings
    pub fn with_settings(kv: S, settings: HistorySettings) -> Self {
        Self { kv, settings }
    }

    /// Settings in effect
    pub fn settings(&self) -> HistorySettings {
        self.settings
    }

    /// Load the chat collection, treating missing or corrupt data as empty
    fn load_chats(&self) -> Vec<Chat> {
        let raw = match self.kv.get(CHATS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read chat history, using empty history: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(chats) => chats,
            Err(e) => {
                tracing::warn!("Stored chat history is corrupt, using empty history: {}", e);
                Vec::new()
            }
        }
    }

    fn write_chats(&self, chats: &[Chat]) -> Result<()> {
        let raw = serde_json::to_string(chats)?;
        self.kv.set(CHATS_KEY, &raw)
    }

    /// Write the collection; log and report failure as `false`
    fn persist(&self, chats: &[Chat]) -> bool {
        match self.write_chats(chats) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to persist chat history: {}", e);
                false
            }
        }
    }

    /// Write the collection, evicting one batch of old chats if the quota is hit
    ///
    /// `keep` names a chat that must survive eviction (the one being appended to).
    fn persist_with_eviction(&self, chats: &mut Vec<Chat>, keep: &str) -> bool {
        let err = match self.write_chats(chats) {
            Ok(()) => return true,
            Err(e) => e,
        };

        if !is_quota_exceeded(&err) {
            tracing::error!("Failed to persist chat history: {}", err);
            return false;
        }

        let evicted = self.evict_tail(chats, keep);
        tracing::warn!(
            "Storage quota exceeded, evicted {} oldest chats and retrying",
            evicted.len()
        );

        if let Err(e) = self.write_chats(chats) {
            tracing::error!("Failed to persist chat history after eviction: {}", e);
            return false;
        }

        if let Some(current) = self.current_chat_id() {
            if evicted.contains(&current) {
                self.clear_focus();
            }
        }
        true
    }

    /// Focus a freshly created chat, evicting one batch of old chats if the quota is hit
    ///
    /// `chats` is the collection just persisted; it shrinks when eviction runs.
    fn focus_with_eviction(&self, chats: &mut Vec<Chat>, id: &str) -> bool {
        let err = match self.kv.set(CURRENT_CHAT_KEY, id) {
            Ok(()) => return true,
            Err(e) => e,
        };

        if !is_quota_exceeded(&err) {
            tracing::error!("Failed to store current chat: {}", err);
            return false;
        }

        let evicted = self.evict_tail(chats, id);
        tracing::warn!(
            "Storage quota exceeded while focusing {}, evicted {} oldest chats and retrying",
            id,
            evicted.len()
        );
        if evicted.is_empty() || !self.persist(chats) {
            return false;
        }

        match self.kv.set(CURRENT_CHAT_KEY, id) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to store current chat after eviction: {}", e);
                false
            }
        }
    }

    /// Drop up to `eviction_batch` chats from the tail, skipping `keep`
    fn evict_tail(&self, chats: &mut Vec<Chat>, keep: &str) -> Vec<String> {
        let mut evicted = Vec::new();
        let mut index = chats.len();
        while index > 0 && evicted.len() < self.settings.eviction_batch {
            index -= 1;
            if chats[index].id != keep {
                evicted.push(chats.remove(index).id);
            }
        }
        evicted
    }

    fn clear_focus(&self) -> bool {
        match self.kv.remove(CURRENT_CHAT_KEY) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to clear current chat: {}", e);
                false
            }
        }
    }

    /// Append a message, creating a new chat when `chat_id` is `None`
    ///
    /// A new chat is inserted at the front of the collection, titled from
    /// `message`, and becomes the focused chat.
    ///
    /// # Returns
    ///
    /// The id of the chat the message was appended to, or `None` if the
    /// chat does not exist or the write failed even after eviction. On
    /// failure nothing is persisted.
    pub fn append(&self, chat_id: Option<&str>, message: Message) -> Option<String> {
        let mut chats = self.load_chats();

        let (id, created) = match chat_id {
            Some(id) => {
                if !chats.iter().any(|c| c.id == id) {
                    tracing::warn!("Cannot append to unknown chat {}", id);
                    return None;
                }
                (id.to_string(), false)
            }
            None => {
                let chat = Chat {
                    id: new_chat_id(),
                    title: derive_title(&message.content),
                    messages: Vec::new(),
                    archived: false,
                    timestamp: Utc::now(),
                };
                tracing::debug!("Creating chat {} titled {:?}", chat.id, chat.title);
                let id = chat.id.clone();
                chats.insert(0, chat);
                (id, true)
            }
        };

        if let Some(chat) = chats.iter_mut().find(|c| c.id == id) {
            chat.messages.push(message);
        }

        if !self.persist_with_eviction(&mut chats, &id) {
            return None;
        }

        if created && !self.focus_with_eviction(&mut chats, &id) {
            // an unfocused new chat would split the conversation on the next send
            chats.retain(|c| c.id != id);
            if !self.persist(&chats) {
                tracing::error!("Chat {} saved but could not be focused or removed", id);
            }
            return None;
        }

        Some(id)
    }

    /// List chats on one side of the archive flag, newest first
    pub fn list(&self, filter: ChatFilter) -> Vec<ChatSummary> {
        self.load_chats()
            .iter()
            .filter(|chat| filter.matches(chat))
            .map(ChatSummary::from)
            .collect()
    }

    /// Fetch a whole chat
    pub fn get(&self, chat_id: &str) -> Option<Chat> {
        self.load_chats().into_iter().find(|c| c.id == chat_id)
    }

    /// Window over a chat's messages using the configured page size
    ///
    /// Pages are numbered from 1; page 0 is treated as page 1.
    pub fn page(&self, chat_id: &str, page_number: usize) -> Option<HistoryPage> {
        self.page_with_size(chat_id, page_number, self.settings.page_size)
    }

    /// Window over a chat's messages with an explicit page size
    pub fn page_with_size(
        &self,
        chat_id: &str,
        page_number: usize,
        page_size: usize,
    ) -> Option<HistoryPage> {
        let chat = self.get(chat_id)?;
        let page_size = page_size.max(1);
        let start = page_number.max(1).saturating_sub(1).saturating_mul(page_size);
        let end = start.saturating_add(page_size).min(chat.messages.len());

        let messages = if start < chat.messages.len() {
            chat.messages[start..end].to_vec()
        } else {
            Vec::new()
        };

        Some(HistoryPage {
            messages,
            has_more: chat.messages.len() > start.saturating_add(page_size),
        })
    }

    /// Flip a chat's archive flag
    ///
    /// Archiving the focused chat clears the focus pointer.
    ///
    /// # Returns
    ///
    /// The new archive state, or `None` if the chat is unknown or the write failed
    pub fn toggle_archive(&self, chat_id: &str) -> Option<bool> {
        let mut chats = self.load_chats();
        let chat = chats.iter_mut().find(|c| c.id == chat_id)?;
        chat.archived = !chat.archived;
        let archived = chat.archived;

        if !self.persist(&chats) {
            return None;
        }

        if archived && self.current_chat_id().as_deref() == Some(chat_id) {
            self.clear_focus();
        }
        tracing::debug!("Chat {} archived={}", chat_id, archived);
        Some(archived)
    }

    /// Replace a chat's title
    ///
    /// The store does not truncate; enforcing a display length is up to the caller.
    ///
    /// # Returns
    ///
    /// `true` if the new title was persisted; `false` for an empty title,
    /// an unknown chat or a failed write
    pub fn relabel(&self, chat_id: &str, new_title: &str) -> bool {
        let title = new_title.trim();
        if title.is_empty() {
            return false;
        }

        let mut chats = self.load_chats();
        let Some(chat) = chats.iter_mut().find(|c| c.id == chat_id) else {
            return false;
        };
        chat.title = title.to_string();
        self.persist(&chats)
    }

    /// Remove a chat, clearing focus if it was focused
    ///
    /// # Returns
    ///
    /// `true` if a chat was removed and the collection persisted
    pub fn delete(&self, chat_id: &str) -> bool {
        let mut chats = self.load_chats();
        let Some(index) = chats.iter().position(|c| c.id == chat_id) else {
            return false;
        };
        chats.remove(index);

        if !self.persist(&chats) {
            return false;
        }

        if self.current_chat_id().as_deref() == Some(chat_id) {
            self.clear_focus();
        }
        tracing::debug!("Deleted chat {}", chat_id);
        true
    }

    /// Remove every chat and the focus pointer
    pub fn clear_all(&self) -> bool {
        let removed = match self.kv.remove(CHATS_KEY) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to clear chat history: {}", e);
                false
            }
        };
        removed && self.clear_focus()
    }

    /// Serialize the whole collection as a JSON document
    pub fn export(&self) -> String {
        let chats = self.load_chats();
        serde_json::to_string_pretty(&chats).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize chat history: {}", e);
            "[]".to_string()
        })
    }

    /// Replace the collection with a previously exported snapshot
    ///
    /// # Returns
    ///
    /// The number of imported chats
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::Import` if the snapshot cannot be parsed or
    /// stored; existing data is left untouched in either case.
    pub fn import(&self, snapshot: &str) -> Result<usize> {
        let chats: Vec<Chat> = serde_json::from_str(snapshot)
            .map_err(|e| ChatpaneError::Import(format!("Invalid chat history: {}", e)))?;

        self.write_chats(&chats)
            .map_err(|e| ChatpaneError::Import(format!("Failed to store chat history: {}", e)))?;

        if let Some(current) = self.current_chat_id() {
            if !chats.iter().any(|c| c.id == current) {
                self.clear_focus();
            }
        }

        tracing::info!("Imported {} chats", chats.len());
        Ok(chats.len())
    }

    /// Null out `imageData` on every message of `chat_id` carrying `image`
    ///
    /// # Returns
    ///
    /// The number of messages cleared, or `None` if the chat is unknown or the write failed
    pub fn clear_image(&self, chat_id: &str, image: &str) -> Option<usize> {
        let mut chats = self.load_chats();
        let chat = chats.iter_mut().find(|c| c.id == chat_id)?;

        let mut cleared = 0;
        for message in chat
            .messages
            .iter_mut()
            .filter(|m| m.image_data.as_deref() == Some(image))
        {
            message.image_data = None;
            cleared += 1;
        }

        if cleared > 0 && !self.persist(&chats) {
            return None;
        }
        Some(cleared)
    }

    /// The focused chat id, if any
    pub fn current_chat_id(&self) -> Option<String> {
        match self.kv.get(CURRENT_CHAT_KEY) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read current chat: {}", e);
                None
            }
        }
    }

    /// Focus a chat, or clear focus with `None`
    pub fn set_current_chat(&self, chat_id: Option<&str>) -> bool {
        match chat_id {
            Some(id) => match self.kv.set(CURRENT_CHAT_KEY, id) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("Failed to store current chat: {}", e);
                    false
                }
            },
            None => self.clear_focus(),
        }
    }

    /// Stored preferences, defaults when absent or unreadable
    pub fn preferences(&self) -> Preferences {
        match self.kv.get(PREFERENCES_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Stored preferences are corrupt, using defaults: {}", e);
                Preferences::default()
            }),
            Ok(None) => Preferences::default(),
            Err(e) => {
                tracing::warn!("Failed to read preferences: {}", e);
                Preferences::default()
            }
        }
    }

    /// Persist preferences
    pub fn save_preferences(&self, preferences: &Preferences) -> bool {
        let result = serde_json::to_string(preferences)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.kv.set(PREFERENCES_KEY, &raw));

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to store preferences: {}", e);
                false
            }
        }
    }
}
