use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use cs_assets::{AssetStore, MemoryStore, NotificationGate, Notifications, OperationQueue, PersistenceWorker};
use cs_domain::config::Config;
use cs_mutation::MutationEngine;

use crate::cancel::CancelMap;
use crate::mutator::{MirrorEnvelope, SharedEngine};
use crate::session_lock::ChatLockMap;

/// Shared runtime state.
///
/// - **Storage**: the asset store, its reload notifications
/// - **Mutation**: the authoritative engine and the mirror channel
/// - **Concurrency**: per-chat write locks and stream cancellation
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Storage ───────────────────────────────────────────────────────
    pub store: Arc<dyn AssetStore>,
    pub notifications: Arc<Notifications>,

    // ── Mutation ──────────────────────────────────────────────────────
    pub engine: SharedEngine,
    pub queue: OperationQueue,
    pub mirror_tx: mpsc::UnboundedSender<MirrorEnvelope>,

    // ── Concurrency ───────────────────────────────────────────────────
    pub chat_locks: Arc<ChatLockMap>,
    pub cancel_map: Arc<CancelMap>,
}

impl AppState {
    /// Wire the engine to `store` and spawn the persistence worker.
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: Config,
        store: Arc<dyn AssetStore>,
        notifications: Arc<Notifications>,
    ) -> (Self, mpsc::UnboundedReceiver<MirrorEnvelope>) {
        let gate = notifications.gate().clone();
        let (queue, rx) = OperationQueue::new(gate.clone());
        PersistenceWorker::new(rx, store.clone(), gate, &config.persistence).spawn();

        let (mirror_tx, mirror_rx) = mpsc::unbounded_channel();
        let state = Self {
            config: Arc::new(config),
            store,
            notifications,
            engine: Arc::new(Mutex::new(MutationEngine::new(queue.clone()))),
            queue,
            mirror_tx,
            chat_locks: Arc::new(ChatLockMap::new()),
            cancel_map: Arc::new(CancelMap::new()),
        };
        (state, mirror_rx)
    }

    /// State over a volatile store, for tests and dry runs.
    pub fn in_memory(
        config: Config,
        store: Arc<MemoryStore>,
    ) -> (Self, mpsc::UnboundedReceiver<MirrorEnvelope>) {
        let notifications = Arc::new(Notifications::new(Arc::new(NotificationGate::new())));
        Self::new(config, store, notifications)
    }
}
