//! Durable key-value storage for the chat collection
//!
//! The history layer only needs three independently readable and writable
//! string slots, so storage is modelled as a tiny key-value interface with
//! an optional byte quota. `SledStore` persists to an embedded `sled`
//! database; `MemoryStore` keeps everything in process and is used by
//! tests and ephemeral sessions.

use crate::error::{ChatpaneError, Result};
use directories::ProjectDirs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub mod types;
pub use types::{Chat, ChatFilter, ChatSummary, HistoryPage, Message, Preferences};

/// Key holding the serialized chat collection (newest first)
pub const CHATS_KEY: &str = "chats";
/// Key holding the focused chat id
pub const CURRENT_CHAT_KEY: &str = "currentChatId";
/// Key holding user preferences
pub const PREFERENCES_KEY: &str = "preferences";

/// Minimal string key-value interface used by the history store
///
/// Implementations must leave the previous value untouched when `set`
/// fails, so a rejected write never produces a partially updated slot.
pub trait KeyValueStore {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::QuotaExceeded` when the write would exceed
    /// the store's capacity, `ChatpaneError::Storage` for backend failures.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Reject a write whose resulting total size would exceed `quota`
fn check_quota(quota: Option<usize>, others: usize, incoming: usize) -> Result<()> {
    if let Some(limit) = quota {
        let required = others + incoming;
        if required > limit {
            return Err(ChatpaneError::QuotaExceeded { limit, required }.into());
        }
    }
    Ok(())
}

/// `sled`-backed store
pub struct SledStore {
    db: sled::Db,
    quota_bytes: Option<usize>,
}

impl SledStore {
    /// Open or create a store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Database directory
    /// * `quota_bytes` - Maximum total size of stored values, `None` for unlimited
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use chatpane::storage::SledStore;
    ///
    /// # fn main() -> chatpane::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let store = SledStore::open(dir.path().join("history.sled"), None)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>, quota_bytes: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChatpaneError::Storage(format!("Failed to create data directory: {}", e))
            })?;
        }

        let db = sled::open(path)
            .map_err(|e| ChatpaneError::Storage(format!("Failed to open database: {}", e)))?;
        tracing::debug!("Opened history database at {}", path.display());
        Ok(Self { db, quota_bytes })
    }

    /// Open a throwaway store that is deleted when dropped
    pub fn temporary(quota_bytes: Option<usize>) -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| ChatpaneError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db, quota_bytes })
    }

    /// Default database location in the user's data directory
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "chatpane", "chatpane").ok_or_else(|| {
            ChatpaneError::Storage("Could not determine data directory".to_string())
        })?;
        Ok(proj_dirs.data_dir().join("history.sled"))
    }

    fn others_size(&self, key: &str) -> Result<usize> {
        let mut total = 0;
        for entry in self.db.iter() {
            let (k, v) =
                entry.map_err(|e| ChatpaneError::Storage(format!("Iteration failed: {}", e)))?;
            if k.as_ref() != key.as_bytes() {
                total += v.len();
            }
        }
        Ok(total)
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| ChatpaneError::Storage(format!("Get failed: {}", e)))?;

        match value {
            Some(bytes) => {
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|e| ChatpaneError::Storage(format!("Value is not UTF-8: {}", e)))?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_quota(self.quota_bytes, self.others_size(key)?, value.len())?;

        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| ChatpaneError::Storage(format!("Insert failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| ChatpaneError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| ChatpaneError::Storage(format!("Remove failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| ChatpaneError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }
}

/// In-process store with the same quota semantics as `SledStore`
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an empty, unlimited store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that rejects writes beyond `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Total size of all stored values
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.values().map(String::len).sum())
            .unwrap_or(0)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ChatpaneError::Storage("Failed to acquire read lock".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ChatpaneError::Storage("Failed to acquire write lock".to_string()))?;

        let others: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len())
            .sum();
        check_quota(self.quota_bytes, others, value.len())?;

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ChatpaneError::Storage("Failed to acquire write lock".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}
