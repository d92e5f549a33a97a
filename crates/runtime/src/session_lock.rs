//! Per-chat writer exclusion.
//!
//! Only one [`ChatMutator`](crate::mutator::ChatMutator) may exist per chat
//! at a time. A second writer either waits for the permit or, through
//! [`ChatLockMap::try_acquire`], is turned away as busy.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Each chat id maps to a `Semaphore(1)`; the permit is the write lock and
/// releases on drop.
pub struct ChatLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for ChatLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, chat_id: &str) -> Arc<Semaphore> {
        self.locks
            .lock()
            .entry(chat_id.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Wait for the write lock of a chat.
    pub async fn acquire(&self, chat_id: &str) -> Result<OwnedSemaphorePermit, ChatBusy> {
        let sem = self.semaphore(chat_id);
        if let Ok(permit) = sem.clone().try_acquire_owned() {
            return Ok(permit);
        }
        tracing::debug!(chat_id, "waiting for chat write lock");
        sem.acquire_owned().await.map_err(|_| ChatBusy(chat_id.to_owned()))
    }

    /// Take the write lock only if nobody holds it.
    pub fn try_acquire(&self, chat_id: &str) -> Result<OwnedSemaphorePermit, ChatBusy> {
        self.semaphore(chat_id)
            .try_acquire_owned()
            .map_err(|_| ChatBusy(chat_id.to_owned()))
    }

    /// Number of tracked chats.
    pub fn chat_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Forget the lock of `chat_id` once nobody holds or waits for it.
    /// Holders and waiters keep a clone of the semaphore, and new ones clone
    /// it under the map lock, so a sole reference means the chat is idle.
    pub fn release(&self, chat_id: &str) {
        let mut locks = self.locks.lock();
        let idle = locks
            .get(chat_id)
            .map_or(false, |sem| Arc::strong_count(sem) == 1 && sem.available_permits() == 1);
        if idle {
            locks.remove(chat_id);
        }
    }
}

/// The chat already has a writer.
#[derive(Debug)]
pub struct ChatBusy(pub String);

impl std::fmt::Display for ChatBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chat {} is busy: another writer holds it", self.0)
    }
}

impl std::error::Error for ChatBusy {}
