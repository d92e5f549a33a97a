//! The single writer of a chat.
//!
//! A [`ChatMutator`] holds the chat's write lock for as long as it lives.
//! Every mutation goes through the shared [`MutationEngine`] first; only
//! applied mutations are forwarded, unmodified and in apply order, to the
//! mirror channel.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, OwnedSemaphorePermit};

use cs_domain::chat::Chat;
use cs_domain::error::{Error, Result};
use cs_mutation::{ChatMutation, Mutation, MutationEngine, ObjectType, Reference};

use crate::session_lock::ChatLockMap;
use crate::state::AppState;

/// Engine shared by every mutator; locked only for the synchronous apply.
pub type SharedEngine = Arc<Mutex<MutationEngine>>;

/// A mutation on its way to mirrors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorEnvelope {
    pub chat_id: String,
    pub mutation: Mutation,
}

pub struct ChatMutator {
    chat_id: String,
    engine: SharedEngine,
    mirror: mpsc::UnboundedSender<MirrorEnvelope>,
    permit: Option<OwnedSemaphorePermit>,
    locks: Option<Arc<ChatLockMap>>,
}

impl ChatMutator {
    pub fn new(
        chat_id: impl Into<String>,
        engine: SharedEngine,
        mirror: mpsc::UnboundedSender<MirrorEnvelope>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            engine,
            mirror,
            permit: Some(permit),
            locks: None,
        }
    }

    /// Take the chat's write lock without looking at the chat itself.
    async fn lock(state: &AppState, chat_id: &str) -> Result<Self> {
        let permit = state
            .chat_locks
            .acquire(chat_id)
            .await
            .map_err(|e| Error::Other(e.to_string()))?;

        let mut mutator = Self::new(
            chat_id,
            state.engine.clone(),
            state.mirror_tx.clone(),
            permit,
        );
        mutator.locks = Some(state.chat_locks.clone());
        Ok(mutator)
    }

    fn load(&self, state: &AppState) -> bool {
        state
            .engine
            .lock()
            .ensure_loaded(state.store.as_ref(), &self.chat_id)
    }

    /// Wait for the chat's write lock and make sure the chat is loaded.
    pub async fn acquire(state: &AppState, chat_id: &str) -> Result<Self> {
        let mutator = Self::lock(state, chat_id).await?;
        if !mutator.load(state) {
            return Err(Error::AssetNotFound(chat_id.to_owned()));
        }
        Ok(mutator)
    }

    /// Create `chat_id` as a root chat from `payload` under its write lock.
    /// The `create` is forwarded like any other mutation, so mirrors learn
    /// about the root before its first edit. An existing chat is replaced.
    pub async fn create_root(state: &AppState, chat_id: &str, payload: Value) -> Result<Self> {
        let mutator = Self::lock(state, chat_id).await?;
        mutator.mutate(Mutation::create(
            Reference::chat(chat_id),
            ObjectType::Chat,
            payload,
        ))?;
        Ok(mutator)
    }

    /// Like [`acquire`](Self::acquire), but a chat that neither memory nor
    /// storage knows is created empty first.
    pub async fn acquire_or_create(state: &AppState, chat_id: &str) -> Result<Self> {
        let mutator = Self::lock(state, chat_id).await?;
        if !mutator.load(state) {
            tracing::info!(chat_id, "creating chat");
            mutator.mutate(Mutation::create(
                Reference::chat(chat_id),
                ObjectType::Chat,
                json!({}),
            ))?;
        }
        Ok(mutator)
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Snapshot of the chat as it is now.
    pub fn chat(&self) -> Result<Chat> {
        self.engine
            .lock()
            .chat(&self.chat_id)
            .cloned()
            .ok_or_else(|| Error::AssetNotFound(self.chat_id.clone()))
    }

    fn check_owner(&self, mutation: &Mutation) -> Result<()> {
        match mutation.reference().root_id() {
            Some(id) if id == self.chat_id => Ok(()),
            _ => Err(Error::InvalidValue(format!(
                "{} does not belong to chat {}",
                mutation.reference(),
                self.chat_id
            ))),
        }
    }

    /// Apply a mutation and forward it to mirrors.
    pub fn mutate(&self, mutation: Mutation) -> Result<()> {
        self.check_owner(&mutation)?;
        let mut engine = self.engine.lock();
        engine.apply(&mutation)?;

        let envelope = MirrorEnvelope {
            chat_id: self.chat_id.clone(),
            mutation,
        };
        if self.mirror.send(envelope).is_err() {
            tracing::debug!(chat_id = %self.chat_id, "no mirror listening");
        }
        Ok(())
    }

    /// Lower a typed edit against the current chat and apply it.
    pub fn mutate_typed(&self, edit: ChatMutation) -> Result<()> {
        let mutation = edit.to_mutation(&self.chat()?)?;
        self.mutate(mutation)
    }

    /// Apply a mutation that came from a client. It is not echoed back.
    pub fn apply_remote(&self, mutation: &Mutation) -> Result<()> {
        self.check_owner(mutation)?;
        self.engine.lock().apply(mutation)
    }
}

impl Drop for ChatMutator {
    fn drop(&mut self) {
        drop(self.permit.take());
        if let Some(locks) = &self.locks {
            locks.release(&self.chat_id);
        }
    }
}
