//! Recording push provider for tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::delivery::push::{is_expo_push_token, PushError, PushProvider};
use crate::delivery::types::{PushMessage, PushTicket};

#[derive(Default)]
struct FakeState {
    chunks: Vec<Vec<PushMessage>>,
    // Configurable failure modes
    fail_chunks: HashSet<usize>,
    rejected_tokens: HashSet<String>,
    calls: usize,
}

/// Records every chunk it is asked to send.
#[derive(Clone)]
pub struct FakePushProvider {
    state: Arc<Mutex<FakeState>>,
    chunk_size: usize,
}

impl Default for FakePushProvider {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FakePushProvider {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            chunk_size,
        }
    }

    /// Fail the n-th `send_chunk` call (0-based).
    pub fn fail_chunk(&self, index: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_chunks.insert(index);
        }
    }

    /// Return an error ticket for this token.
    pub fn reject_token(&self, token: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.rejected_tokens.insert(token.to_string());
        }
    }

    /// Chunks that were accepted, in call order.
    pub fn chunks(&self) -> Vec<Vec<PushMessage>> {
        self.state.lock().map(|s| s.chunks.clone()).unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.chunks().into_iter().flatten().collect()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().map(|s| s.calls).unwrap_or_default()
    }
}

#[async_trait]
impl PushProvider for FakePushProvider {
    fn is_valid_token(&self, token: &str) -> bool {
        is_expo_push_token(token)
    }

    fn max_chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn send_chunk(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, PushError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PushError::Decode("fake state poisoned".to_string()))?;

        let index = state.calls;
        state.calls += 1;
        if state.fail_chunks.contains(&index) {
            return Err(PushError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        state.chunks.push(messages.to_vec());
        Ok(messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                if state.rejected_tokens.contains(&m.to) {
                    PushTicket::Error {
                        message: format!("{} is not a registered push notification recipient", m.to),
                        details: Some(serde_json::json!({"error": "DeviceNotRegistered"})),
                    }
                } else {
                    PushTicket::Ok {
                        id: format!("ticket-{}-{}", index, i),
                    }
                }
            })
            .collect())
    }
}
