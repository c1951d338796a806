//! Configuration management for Chatpane
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ChatpaneError, Result};
use crate::history::{HistorySettings, DEFAULT_EVICTION_BATCH, DEFAULT_PAGE_SIZE};
use crate::render::{Phase, PhaseSchedule};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Chatpane
///
/// This structure holds everything needed to reach the chat endpoint,
/// persist history, and pace the rendering of responses.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote chat endpoint settings
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// History persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Response rendering settings
    #[serde(default)]
    pub render: RenderConfig,
}

/// Remote chat endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the chat server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the chat endpoint
    #[serde(default = "default_chat_path")]
    pub chat_path: String,

    /// Path of the `hf_` key verification endpoint
    #[serde(default = "default_verify_key_path")]
    pub verify_key_path: String,

    /// Path of the chat key verification endpoint
    #[serde(default = "default_verify_gemini_key_path")]
    pub verify_gemini_key_path: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_chat_path() -> String {
    "/chat".to_string()
}

fn default_verify_key_path() -> String {
    "/verify_api_key".to_string()
}

fn default_verify_gemini_key_path() -> String {
    "/verify-gemini-key".to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            verify_key_path: default_verify_key_path(),
            verify_gemini_key_path: default_verify_gemini_key_path(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl EndpointConfig {
    /// Join `path` onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// History persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database location; the platform data directory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum bytes of stored values; 0 disables the quota
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: usize,

    /// Chats dropped from the tail when a write exceeds the quota
    #[serde(default = "default_eviction_batch")]
    pub eviction_batch: usize,

    /// Messages per history page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_quota_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_eviction_batch() -> usize {
    DEFAULT_EVICTION_BATCH
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            quota_bytes: default_quota_bytes(),
            eviction_batch: default_eviction_batch(),
            page_size: default_page_size(),
        }
    }
}

impl StorageConfig {
    /// Quota to hand to the store, `None` when disabled
    pub fn quota(&self) -> Option<usize> {
        (self.quota_bytes > 0).then_some(self.quota_bytes)
    }

    /// Pagination and eviction settings for the history store
    pub fn history_settings(&self) -> HistorySettings {
        HistorySettings {
            page_size: self.page_size,
            eviction_batch: self.eviction_batch,
        }
    }
}

/// One reveal speed band
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseConfig {
    /// Band applies while fewer characters than this have been revealed
    pub threshold: usize,
    /// Pause after each character, in milliseconds
    pub delay_ms: u64,
}

/// Response rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Type out fresh responses
    #[serde(default = "default_animate")]
    pub animate: bool,

    /// Speed bands, by ascending threshold
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseConfig>,

    /// Pause per character once every band is exhausted, in milliseconds
    #[serde(default = "default_final_delay_ms")]
    pub final_delay_ms: u64,
}

fn default_animate() -> bool {
    true
}

fn default_phases() -> Vec<PhaseConfig> {
    [(15, 60), (25, 30), (40, 15), (60, 5)]
        .into_iter()
        .map(|(threshold, delay_ms)| PhaseConfig {
            threshold,
            delay_ms,
        })
        .collect()
}

fn default_final_delay_ms() -> u64 {
    2
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            animate: default_animate(),
            phases: default_phases(),
            final_delay_ms: default_final_delay_ms(),
        }
    }
}

impl RenderConfig {
    /// Build the reveal schedule described by this configuration
    pub fn schedule(&self) -> PhaseSchedule {
        PhaseSchedule::new(
            self.phases
                .iter()
                .map(|p| Phase {
                    threshold: p.threshold,
                    delay: Duration::from_millis(p.delay_ms),
                })
                .collect(),
            Duration::from_millis(self.final_delay_ms),
        )
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatpaneError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatpaneError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("CHATPANE_BASE_URL") {
            self.endpoint.base_url = base_url;
        }

        if let Ok(path) = std::env::var("CHATPANE_STORAGE_PATH") {
            if path.trim().is_empty() {
                tracing::warn!("Ignoring empty CHATPANE_STORAGE_PATH");
            } else {
                self.storage.path = Some(PathBuf::from(path));
            }
        }

        if let Ok(quota) = std::env::var("CHATPANE_QUOTA_BYTES") {
            if let Ok(value) = quota.parse() {
                self.storage.quota_bytes = value;
            } else {
                tracing::warn!("Invalid CHATPANE_QUOTA_BYTES: {}", quota);
            }
        }

        if let Ok(page_size) = std::env::var("CHATPANE_PAGE_SIZE") {
            if let Ok(value) = page_size.parse() {
                self.storage.page_size = value;
            } else {
                tracing::warn!("Invalid CHATPANE_PAGE_SIZE: {}", page_size);
            }
        }

        if let Ok(animate) = std::env::var("CHATPANE_ANIMATE") {
            match animate.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.render.animate = true,
                "0" | "false" | "no" | "off" => self.render.animate = false,
                _ => tracing::warn!("Invalid CHATPANE_ANIMATE: {}", animate),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(path) = &cli.storage_path {
            self.storage.path = Some(path.clone());
        }

        if let crate::cli::Commands::Chat {
            no_animate: true, ..
        } = &cli.command
        {
            self.render.animate = false;
        }
    }

    /// Resolved database location
    ///
    /// # Errors
    ///
    /// Returns error if no path is configured and the platform data
    /// directory cannot be determined
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => crate::storage::SledStore::default_path(),
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.endpoint.base_url).map_err(|e| {
            ChatpaneError::Config(format!(
                "Invalid endpoint.base_url '{}': {}",
                self.endpoint.base_url, e
            ))
        })?;

        for (name, path) in [
            ("chat_path", &self.endpoint.chat_path),
            ("verify_key_path", &self.endpoint.verify_key_path),
            ("verify_gemini_key_path", &self.endpoint.verify_gemini_key_path),
        ] {
            if !path.starts_with('/') {
                return Err(ChatpaneError::Config(format!(
                    "endpoint.{} must start with '/': {}",
                    name, path
                ))
                .into());
            }
        }

        if self.endpoint.timeout_seconds == 0 {
            return Err(ChatpaneError::Config(
                "endpoint.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.page_size == 0 {
            return Err(
                ChatpaneError::Config("storage.page_size must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.storage.eviction_batch == 0 {
            return Err(ChatpaneError::Config(
                "storage.eviction_batch must be greater than 0".to_string(),
            )
            .into());
        }

        if self
            .render
            .phases
            .windows(2)
            .any(|pair| pair[0].threshold >= pair[1].threshold)
        {
            return Err(ChatpaneError::Config(
                "render.phases thresholds must be strictly increasing".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::test_utils::{assert_error_contains, create_test_file, temp_dir, test_config_yaml};
    use serial_test::serial;

    fn cli_with(command: Commands) -> Cli {
        Cli {
            config: None,
            verbose: false,
            storage_path: None,
            command,
        }
    }

    fn clear_env() {
        for key in [
            "CHATPANE_BASE_URL",
            "CHATPANE_STORAGE_PATH",
            "CHATPANE_QUOTA_BYTES",
            "CHATPANE_PAGE_SIZE",
            "CHATPANE_ANIMATE",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint.base_url, "http://localhost:5000");
        assert_eq!(config.endpoint.chat_path, "/chat");
        assert_eq!(config.endpoint.timeout_seconds, 60);
        assert_eq!(config.storage.quota_bytes, 5 * 1024 * 1024);
        assert_eq!(config.storage.eviction_batch, 10);
        assert_eq!(config.storage.page_size, 50);
        assert!(config.render.animate);
        assert_eq!(config.render.schedule(), PhaseSchedule::default());
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_url() {
        let mut config = Config::default();
        config.endpoint.base_url = "not a url".to_string();
        assert_error_contains(config.validate(), "Invalid endpoint.base_url");
    }

    #[test]
    fn test_config_validation_relative_path() {
        let mut config = Config::default();
        config.endpoint.chat_path = "chat".to_string();
        assert_error_contains(config.validate(), "chat_path");
    }

    #[test]
    fn test_config_validation_zero_values() {
        let mut config = Config::default();
        config.storage.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.eviction_batch = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.endpoint.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_unordered_phases() {
        let mut config = Config::default();
        config.render.phases = vec![
            PhaseConfig {
                threshold: 20,
                delay_ms: 10,
            },
            PhaseConfig {
                threshold: 20,
                delay_ms: 5,
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_url_join() {
        let mut endpoint = EndpointConfig::default();
        endpoint.base_url = "http://example.com/".to_string();
        assert_eq!(endpoint.url("/chat"), "http://example.com/chat");
    }

    #[test]
    fn test_zero_quota_disables_limit() {
        let mut storage = StorageConfig::default();
        assert_eq!(storage.quota(), Some(5 * 1024 * 1024));
        storage.quota_bytes = 0;
        assert_eq!(storage.quota(), None);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
endpoint:
  base_url: http://chat.internal:8080
render:
  animate: false
  phases:
    - threshold: 10
      delay_ms: 20
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.endpoint.base_url, "http://chat.internal:8080");
        assert_eq!(config.endpoint.chat_path, "/chat");
        assert!(!config.render.animate);
        assert_eq!(config.render.phases.len(), 1);
        assert_eq!(config.render.final_delay_ms, 2);
        assert_eq!(config.storage.page_size, 50);
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        clear_env();
        let cli = cli_with(Commands::Export { output: None });
        let config = Config::load("nonexistent.yaml", &cli).unwrap();
        assert_eq!(config.endpoint.base_url, "http://localhost:5000");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let dir = temp_dir();
        let path = create_test_file(&dir, "config.yaml", &test_config_yaml());

        let cli = cli_with(Commands::Export { output: None });
        let config = Config::load(path.to_str().unwrap(), &cli).unwrap();
        assert_eq!(config.storage.page_size, 20);
        assert_eq!(config.storage.eviction_batch, 5);
        assert_eq!(config.endpoint.timeout_seconds, 30);
        assert!(!config.render.animate);
        assert_eq!(config.render.phases.len(), 2);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("CHATPANE_BASE_URL", "http://env.example:9000");
        std::env::set_var("CHATPANE_QUOTA_BYTES", "1024");
        std::env::set_var("CHATPANE_PAGE_SIZE", "not-a-number");
        std::env::set_var("CHATPANE_ANIMATE", "off");

        let cli = cli_with(Commands::Export { output: None });
        let config = Config::load("nonexistent.yaml", &cli).unwrap();
        clear_env();

        assert_eq!(config.endpoint.base_url, "http://env.example:9000");
        assert_eq!(config.storage.quota_bytes, 1024);
        assert_eq!(config.storage.page_size, 50);
        assert!(!config.render.animate);
    }

    #[test]
    #[serial]
    fn test_cli_overrides() {
        clear_env();
        let mut cli = cli_with(Commands::Chat {
            resume: None,
            no_animate: true,
        });
        cli.storage_path = Some(PathBuf::from("/tmp/chatpane-test.sled"));

        let config = Config::load("nonexistent.yaml", &cli).unwrap();
        assert!(!config.render.animate);
        assert_eq!(
            config.storage_path().unwrap(),
            PathBuf::from("/tmp/chatpane-test.sled")
        );
    }
}
