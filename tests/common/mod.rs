use chatpane::history::{HistorySettings, HistoryStore};
use chatpane::storage::SledStore;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_history() -> (HistoryStore<SledStore>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let history = open_history_at(&tmp.path().join("history.sled"), HistorySettings::default());
    (history, tmp)
}

#[allow(dead_code)]
pub fn open_history_at(path: &Path, settings: HistorySettings) -> HistoryStore<SledStore> {
    let store = SledStore::open(path, None).expect("failed to open sled store");
    HistoryStore::with_settings(store, settings)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// A 1x1 transparent PNG, base64 encoded
#[allow(dead_code)]
pub const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";
