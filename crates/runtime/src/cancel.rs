//! Per-chat cancellation of in-flight model streams.
//!
//! Each running analysis registers a [`CancellationToken`]. Cancelling it
//! wakes the `select!` around the stream, which then drops the stream and
//! with it the HTTP request.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Tracks active cancellation tokens per chat id.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh token for a chat, replacing any previous
    /// one.
    pub fn register(&self, chat_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(chat_id.to_owned(), token.clone());
        token
    }

    /// Cancel the running stream of a chat. Returns true if a token was
    /// found.
    pub fn cancel(&self, chat_id: &str) -> bool {
        match self.tokens.lock().get(chat_id) {
            Some(token) => {
                tracing::info!(chat_id, "cancelling chat stream");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the token for a chat (called when its stream completes).
    pub fn remove(&self, chat_id: &str) {
        self.tokens.lock().remove(chat_id);
    }

    pub fn is_running(&self, chat_id: &str) -> bool {
        self.tokens.lock().contains_key(chat_id)
    }
}
