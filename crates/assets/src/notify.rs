//! Suppression of reload notifications caused by our own writes.
//!
//! Storage fires a reload notification whenever an asset changes on disk,
//! including when the change was our own queued write. Those must not be
//! forwarded to clients (they already have the change via mutations).
//!
//! Each self-originated write bumps a per-asset generation when it is
//! queued. A reload notification for an asset is suppressed iff that
//! asset's last self-write generation is ahead of the last generation a
//! notification consumed; the notification then consumes up to it. Several
//! writes that coalesce into one disk write therefore suppress exactly one
//! notification, and an external change arriving afterwards is delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use cs_domain::trace::TraceEvent;

#[derive(Debug, Default, Clone, Copy)]
struct Generations {
    last_self_write: u64,
    consumed: u64,
}

/// Per-asset generation counters for self-originated writes.
#[derive(Debug, Default)]
pub struct NotificationGate {
    next: AtomicU64,
    assets: Mutex<HashMap<String, Generations>>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a write for `asset_id` is about to be queued.
    /// Returns the generation stamped on that write.
    pub fn mark_self_write(&self, asset_id: &str) -> u64 {
        let generation = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let mut assets = self.assets.lock();
        let entry = assets.entry(asset_id.to_owned()).or_default();
        entry.last_self_write = entry.last_self_write.max(generation);
        generation
    }

    /// Decide whether a reload notification for `asset_id` is our own echo.
    /// Returns the consumed generation when it is.
    pub fn try_suppress(&self, asset_id: &str) -> Option<u64> {
        let mut assets = self.assets.lock();
        let entry = assets.get_mut(asset_id)?;
        if entry.consumed < entry.last_self_write {
            entry.consumed = entry.last_self_write;
            Some(entry.consumed)
        } else {
            None
        }
    }

    /// A write stamped with `generation` never reached storage, so no
    /// notification will come for it. Releases the generation unless a
    /// newer self-write is still pending.
    pub fn abandon(&self, asset_id: &str, generation: u64) {
        let mut assets = self.assets.lock();
        if let Some(entry) = assets.get_mut(asset_id) {
            if entry.last_self_write == generation && entry.consumed < generation {
                entry.consumed = generation;
            }
        }
    }

    /// True while a self-write for `asset_id` has not been matched by a
    /// reload notification yet.
    pub fn is_pending(&self, asset_id: &str) -> bool {
        self.assets
            .lock()
            .get(asset_id)
            .map_or(false, |g| g.consumed < g.last_self_write)
    }
}

/// Delivered to subscribers when an asset changed in storage for a reason
/// other than our own queued write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetsUpdated {
    pub asset_id: String,
}

/// Fan-out of storage reload notifications, filtered through the gate.
pub struct Notifications {
    gate: Arc<NotificationGate>,
    tx: broadcast::Sender<AssetsUpdated>,
}

impl Notifications {
    pub fn new(gate: Arc<NotificationGate>) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { gate, tx }
    }

    pub fn gate(&self) -> &Arc<NotificationGate> {
        &self.gate
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssetsUpdated> {
        self.tx.subscribe()
    }

    /// Called by storage after `asset_id` changed. Returns whether the
    /// notification was delivered (as opposed to suppressed).
    pub fn reload(&self, asset_id: &str) -> bool {
        if let Some(generation) = self.gate.try_suppress(asset_id) {
            TraceEvent::ReloadSuppressed {
                asset_id: asset_id.to_owned(),
                generation,
            }
            .emit();
            return false;
        }

        tracing::debug!(asset_id, "assets updated externally");
        // No subscribers is fine.
        let _ = self.tx.send(AssetsUpdated {
            asset_id: asset_id.to_owned(),
        });
        true
    }
}
