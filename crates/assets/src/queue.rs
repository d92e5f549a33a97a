//! Operation queue and background persistence worker.
//!
//! Mutation application never awaits storage. It pushes an
//! [`AssetOperation`] onto an unbounded channel and returns; the
//! [`PersistenceWorker`] drains the channel and performs the writes one at
//! a time, so writes for a given chat reach storage in queue order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use cs_domain::chat::Chat;
use cs_domain::config::PersistenceConfig;
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;

use crate::notify::NotificationGate;
use crate::store::AssetStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence intent produced by applying one mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetOperation {
    Create(Chat),
    Update { id: String, chat: Chat },
    Delete { id: String },
}

impl AssetOperation {
    pub fn asset_id(&self) -> &str {
        match self {
            AssetOperation::Create(chat) => &chat.id,
            AssetOperation::Update { id, .. } | AssetOperation::Delete { id } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AssetOperation::Create(_) => "create",
            AssetOperation::Update { .. } => "update",
            AssetOperation::Delete { .. } => "delete",
        }
    }
}

/// An operation as it sits in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOperation {
    /// Self-write generation, set for updates of existing chats.
    pub generation: Option<u64>,
    pub operation: AssetOperation,
}

enum Command {
    Run(QueuedOperation),
    Flush(oneshot::Sender<()>),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queue handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cheap, cloneable sending side of the queue.
#[derive(Clone)]
pub struct OperationQueue {
    tx: mpsc::UnboundedSender<Command>,
    gate: Arc<NotificationGate>,
}

/// Receiving side, handed to a [`PersistenceWorker`] (or inspected
/// directly in tests).
pub struct PersistenceReceiver {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl OperationQueue {
    pub fn new(gate: Arc<NotificationGate>) -> (Self, PersistenceReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, gate }, PersistenceReceiver { rx })
    }

    pub fn gate(&self) -> &Arc<NotificationGate> {
        &self.gate
    }

    /// Queue an operation. Updates are marked self-originated immediately
    /// before they are queued; root creation and deletion are not.
    pub fn enqueue(&self, operation: AssetOperation) -> Option<u64> {
        let generation = match &operation {
            AssetOperation::Update { id, .. } => Some(self.gate.mark_self_write(id)),
            _ => None,
        };

        tracing::trace!(
            asset_id = operation.asset_id(),
            kind = operation.kind(),
            ?generation,
            "persistence queued"
        );

        if self
            .tx
            .send(Command::Run(QueuedOperation {
                generation,
                operation,
            }))
            .is_err()
        {
            tracing::error!("persistence worker is gone; operation dropped");
        }
        generation
    }

    /// Wait until every operation queued before this call has been handed
    /// to storage.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .map_err(|_| Error::Other("persistence worker stopped".into()))?;
        ack_rx
            .await
            .map_err(|_| Error::Other("persistence worker stopped".into()))
    }
}

impl PersistenceReceiver {
    /// Pop the next queued operation without waiting. Pending flush
    /// requests are acknowledged and skipped.
    pub fn try_next(&mut self) -> Option<QueuedOperation> {
        loop {
            match self.rx.try_recv().ok()? {
                Command::Run(op) => return Some(op),
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<QueuedOperation> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coalescing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fold a batch so each chat's run of updates becomes one write carrying
/// the latest snapshot. An update that follows a create in the same batch
/// folds into the create. Per-chat order is preserved. Returns each
/// surviving operation with the number of queued operations it stands for.
pub fn coalesce(batch: Vec<QueuedOperation>) -> Vec<(QueuedOperation, usize)> {
    let mut out: Vec<(QueuedOperation, usize)> = Vec::with_capacity(batch.len());
    let mut last_for: HashMap<String, usize> = HashMap::new();

    for op in batch {
        let id = op.operation.asset_id().to_owned();

        if let AssetOperation::Update { chat, .. } = &op.operation {
            if let Some(&idx) = last_for.get(&id) {
                let (prev, count) = &mut out[idx];
                let folded = match prev.operation {
                    AssetOperation::Update { .. } => Some(AssetOperation::Update {
                        id: id.clone(),
                        chat: chat.clone(),
                    }),
                    AssetOperation::Create(_) => Some(AssetOperation::Create(chat.clone())),
                    AssetOperation::Delete { .. } => None,
                };
                if let Some(folded) = folded {
                    prev.operation = folded;
                    prev.generation = op.generation.or(prev.generation);
                    *count += 1;
                    continue;
                }
            }
        }

        last_for.insert(id, out.len());
        out.push((op, 1));
    }

    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drains the queue into an [`AssetStore`].
pub struct PersistenceWorker {
    rx: PersistenceReceiver,
    store: Arc<dyn AssetStore>,
    gate: Arc<NotificationGate>,
    window: Duration,
}

impl PersistenceWorker {
    pub fn new(
        rx: PersistenceReceiver,
        store: Arc<dyn AssetStore>,
        gate: Arc<NotificationGate>,
        cfg: &PersistenceConfig,
    ) -> Self {
        Self {
            rx,
            store,
            gate,
            window: Duration::from_millis(cfg.coalesce_window_ms),
        }
    }

    /// Run on the current tokio runtime until every queue handle is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        while let Some(first) = self.rx.rx.recv().await {
            if matches!(first, Command::Run(_)) && !self.window.is_zero() {
                tokio::time::sleep(self.window).await;
            }

            let mut batch = vec![first];
            while let Ok(cmd) = self.rx.rx.try_recv() {
                batch.push(cmd);
            }

            let mut pending = Vec::new();
            for cmd in batch {
                match cmd {
                    Command::Run(op) => pending.push(op),
                    Command::Flush(ack) => {
                        self.execute(std::mem::take(&mut pending)).await;
                        let _ = ack.send(());
                    }
                }
            }
            self.execute(pending).await;
        }

        tracing::debug!("persistence worker stopped");
    }

    async fn execute(&self, batch: Vec<QueuedOperation>) {
        for (op, coalesced) in coalesce(batch) {
            let started = Instant::now();
            let asset_id = op.operation.asset_id().to_owned();
            let kind = op.operation.kind();

            let result = match op.operation {
                AssetOperation::Create(chat) => self.store.create_asset(chat).await,
                AssetOperation::Update { id, chat } => self.store.update_asset(&id, chat).await,
                AssetOperation::Delete { id } => self.store.delete_asset(&id).await,
            };

            match result {
                Ok(()) => TraceEvent::PersistenceWrite {
                    asset_id,
                    operation: kind,
                    coalesced,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
                .emit(),
                Err(e) => {
                    tracing::error!(
                        asset_id = %asset_id,
                        operation = kind,
                        error = %e,
                        "persistence write failed"
                    );
                    // No reload will follow a write that never happened.
                    if let Some(generation) = op.generation {
                        self.gate.abandon(&asset_id, generation);
                    }
                }
            }
        }
    }
}
