//! Chat endpoint client
//!
//! `ChatBackend` abstracts the remote collaborator: one chat call and two
//! key-verification calls. `HttpChatClient` talks to the server over HTTP
//! with `reqwest`; sessions and tests can substitute their own backend.

use crate::config::EndpointConfig;
use crate::error::{ChatpaneError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message shown when a request fails without a usable error message
pub const GENERIC_FAILURE: &str = "Sorry, I encountered an error. Please try again.";

/// Body of an outbound chat request
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's message
    pub message: String,
    /// Key for the chat model
    pub api_key: String,
    /// Key for image generation
    pub hf_api_key: String,
}

/// Body of a chat response
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    /// Response text
    #[serde(default)]
    pub response: Option<String>,
    /// Base64 image generated for the response
    #[serde(default)]
    pub image: Option<String>,
    /// Server-reported error
    #[serde(default)]
    pub error: Option<String>,
}

/// Outcome of a key verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVerification {
    /// Whether the key was accepted
    pub valid: bool,
    /// Message to show the user
    pub message: String,
}

impl KeyVerification {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Remote chat collaborator
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one message and wait for the reply
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::Request` when the server cannot be reached,
    /// `ChatpaneError::NonJsonResponse` when the body is not JSON and
    /// `ChatpaneError::Server` for error statuses.
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// Check the chat model key with the server; never fails
    async fn verify_gemini_key(&self, api_key: &str) -> KeyVerification;

    /// Check an `hf_` key, with a local format check first; never fails
    async fn verify_hf_key(&self, api_key: &str) -> KeyVerification;
}

/// Trim an `hf_` key and strip quotes, or explain why it is unusable
///
/// # Examples
///
/// ```
/// use chatpane::client::clean_hf_key;
///
/// assert_eq!(clean_hf_key(" 'hf_abc' ").unwrap(), "hf_abc");
/// assert!(clean_hf_key("abc").is_err());
/// ```
pub fn clean_hf_key(api_key: &str) -> std::result::Result<String, KeyVerification> {
    if api_key.is_empty() {
        return Err(KeyVerification::rejected(
            "API key must be a non-empty string",
        ));
    }

    let cleaned: String = api_key
        .trim()
        .chars()
        .filter(|c| *c != '\'' && *c != '"')
        .collect();

    if !cleaned.starts_with("hf_") {
        return Err(KeyVerification::rejected(
            "Invalid API key format. Key should start with 'hf_'",
        ));
    }
    Ok(cleaned)
}

#[derive(Debug, Serialize)]
struct KeyRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP implementation of `ChatBackend`
///
/// # Examples
///
/// ```no_run
/// use chatpane::client::{ChatBackend, ChatRequest, HttpChatClient};
/// use chatpane::config::EndpointConfig;
///
/// # async fn example() -> chatpane::error::Result<()> {
/// let client = HttpChatClient::new(EndpointConfig::default())?;
/// let reply = client
///     .send(&ChatRequest {
///         message: "Hello".to_string(),
///         api_key: "key".to_string(),
///         hf_api_key: String::new(),
///     })
///     .await?;
/// println!("{:?}", reply.response);
/// # Ok(())
/// # }
/// ```
pub struct HttpChatClient {
    client: Client,
    endpoint: EndpointConfig,
}

impl HttpChatClient {
    /// Build a client for `endpoint`
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::Request` if the HTTP client cannot be created
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_seconds))
            .user_agent("chatpane/0.1.0")
            .build()
            .map_err(|e| ChatpaneError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// Endpoint this client talks to
    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    async fn post_key(&self, path: &str, api_key: &str) -> reqwest::Result<reqwest::Response> {
        let url = self.endpoint.url(path);
        tracing::debug!("Verifying key at {}", url);
        self.client
            .post(&url)
            .json(&KeyRequest { api_key })
            .send()
            .await
    }
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply> {
        let url = self.endpoint.url(&self.endpoint.chat_path);
        tracing::debug!("Sending chat message to {}", url);

        let response = self
            .client
            .post(&url)
            .header("X-API-Key", &request.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Chat request failed: {}", e);
                ChatpaneError::Request(e.to_string())
            })?;

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("application/json"))
            .unwrap_or(false);
        if !is_json {
            tracing::error!("Chat endpoint returned a non-JSON response");
            return Err(ChatpaneError::NonJsonResponse.into());
        }

        let status = response.status();
        let reply: ChatReply = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse chat response: {}", e);
            ChatpaneError::Request(format!("Failed to parse chat response: {}", e))
        })?;

        if !status.is_success() {
            let message = reply
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "Server error occurred".to_string());
            tracing::error!("Chat endpoint returned {}: {}", status, message);
            return Err(ChatpaneError::Server(message).into());
        }

        tracing::debug!(
            has_response = reply.response.is_some(),
            has_image = reply.image.is_some(),
            "Received chat reply"
        );
        Ok(reply)
    }

    async fn verify_gemini_key(&self, api_key: &str) -> KeyVerification {
        let result = async {
            let response = self
                .post_key(&self.endpoint.verify_gemini_key_path, api_key)
                .await?;
            response.json::<VerifyResponse>().await
        }
        .await;

        match result {
            Ok(body) => {
                let message = if body.valid { body.message } else { body.error };
                KeyVerification {
                    valid: body.valid,
                    message: message.unwrap_or_default(),
                }
            }
            Err(e) => {
                tracing::error!("Error verifying chat API key: {}", e);
                KeyVerification::rejected(format!("Failed to verify API key: {}", e))
            }
        }
    }

    async fn verify_hf_key(&self, api_key: &str) -> KeyVerification {
        let cleaned = match clean_hf_key(api_key) {
            Ok(key) => key,
            Err(rejection) => return rejection,
        };

        let result = async {
            let response = self
                .post_key(&self.endpoint.verify_key_path, &cleaned)
                .await?;
            let status = response.status();
            let body = response.json::<VerifyResponse>().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;

        match result {
            Ok((status, _)) if status.is_success() => KeyVerification {
                valid: true,
                message: "API key verified successfully".to_string(),
            },
            Ok((status, body)) => {
                tracing::warn!("Key verification rejected with {}", status);
                KeyVerification::rejected(
                    body.message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "Failed to verify API key".to_string()),
                )
            }
            Err(e) => {
                tracing::error!("Error verifying API key: {}", e);
                KeyVerification::rejected("Error verifying API key. Please try again.")
            }
        }
    }
}
