use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{PushConfig, MAX_CHUNK_SIZE};
use crate::delivery::types::{PushMessage, PushTicket};

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Push provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Push provider response could not be decoded: {0}")]
    Decode(String),

    #[error("Push chunk timed out after {0}ms")]
    Timeout(u64),
}

/// Contract of the external push-delivery provider.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Provider-specific address check. Invalid tokens are skipped, never sent.
    fn is_valid_token(&self, token: &str) -> bool;

    /// Largest batch accepted by a single `send_chunk` call.
    fn max_chunk_size(&self) -> usize;

    /// Send one batch; tickets are returned in message order.
    async fn send_chunk(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, PushError>;
}

/// Expo-style push token: `ExponentPushToken[...]` or `ExpoPushToken[...]`.
pub fn is_expo_push_token(token: &str) -> bool {
    let inner = token
        .strip_prefix("ExponentPushToken[")
        .or_else(|| token.strip_prefix("ExpoPushToken["));
    match inner.and_then(|rest| rest.strip_suffix(']')) {
        Some(id) => !id.is_empty() && !id.contains(['[', ']']) && !id.contains(char::is_whitespace),
        None => false,
    }
}

pub struct ExpoPushClient {
    client: Client,
    api_url: String,
    access_token: Option<String>,
    chunk_size: usize,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    data: Vec<PushTicket>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

impl ExpoPushClient {
    pub fn new(config: &PushConfig, access_token: Option<String>) -> Result<Self, PushError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            access_token,
            chunk_size: config.chunk_size.min(MAX_CHUNK_SIZE),
        })
    }
}

#[async_trait]
impl PushProvider for ExpoPushClient {
    fn is_valid_token(&self, token: &str) -> bool {
        is_expo_push_token(token)
    }

    fn max_chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn send_chunk(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, PushError> {
        let mut request = self
            .client
            .post(&self.api_url)
            .header("Accept", "application/json")
            .json(messages);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PushResponse = response
            .json()
            .await
            .map_err(|e| PushError::Decode(e.to_string()))?;

        if !parsed.errors.is_empty() {
            return Err(PushError::Decode(format!(
                "request-level errors: {}",
                serde_json::Value::Array(parsed.errors)
            )));
        }
        if parsed.data.len() != messages.len() {
            return Err(PushError::Decode(format!(
                "expected {} tickets, got {}",
                messages.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed.data)
    }
}
