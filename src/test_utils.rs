//! Test utilities for Chatpane
//!
//! This module provides common test utilities including temporary directory
//! management, seeded history stores, and assertion helpers.

use crate::config::Config;
use crate::error::Result;
use crate::history::HistoryStore;
use crate::storage::{MemoryStore, Message};
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// In-memory history with one chat per `(user, bot)` exchange
///
/// Chats are created in order, so the last exchange is the newest chat.
pub fn seeded_history(exchanges: &[(&str, &str)]) -> (HistoryStore<MemoryStore>, Vec<String>) {
    let history = HistoryStore::new(MemoryStore::new());
    let mut ids = Vec::new();
    for (user, bot) in exchanges {
        let id = history
            .append(None, Message::user(*user))
            .expect("Failed to append user message");
        history
            .append(Some(&id), Message::bot(*bot))
            .expect("Failed to append bot message");
        ids.push(id);
    }
    (history, ids)
}

/// Create a test configuration whose database lives in `dir`
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.path = Some(dir.path().join("history.sled"));
    config
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
endpoint:
  base_url: http://localhost:5000
  timeout_seconds: 30

storage:
  quota_bytes: 1048576
  eviction_batch: 5
  page_size: 20

render:
  animate: false
  phases:
    - threshold: 10
      delay_ms: 20
    - threshold: 30
      delay_ms: 5
  final_delay_ms: 1
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ChatFilter;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.txt", "content");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "content");
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<()> =
            Err(crate::error::ChatpaneError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        let result: Result<()> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    fn test_seeded_history() {
        let (history, ids) = seeded_history(&[("a", "b"), ("c", "d")]);
        assert_eq!(ids.len(), 2);
        let listed = history.list(ChatFilter::Active);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[1]);
        assert_eq!(history.get(&ids[0]).unwrap().messages.len(), 2);
    }

    #[test]
    fn test_test_config_yaml() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert!(!config.render.animate);
        assert_eq!(config.storage.page_size, 20);
    }

    #[test]
    fn test_test_config_points_into_dir() {
        let dir = temp_dir();
        let config = test_config(&dir);
        assert_eq!(config.storage_path().unwrap(), dir.path().join("history.sled"));
    }
}
