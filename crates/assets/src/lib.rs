//! Asset persistence for chatsync.
//!
//! The in-memory conversation graph is authoritative; this crate is the
//! only path by which it reaches storage. Mutation application enqueues
//! [`AssetOperation`]s synchronously, a background [`PersistenceWorker`]
//! drains them in order (coalescing bursts of updates to the same chat),
//! and the [`NotificationGate`] makes sure the reload notification that
//! storage fires for our own writes is not echoed back to clients.

pub mod notify;
pub mod queue;
pub mod store;

pub use notify::{AssetsUpdated, NotificationGate, Notifications};
pub use queue::{
    coalesce, AssetOperation, OperationQueue, PersistenceReceiver, PersistenceWorker,
    QueuedOperation,
};
pub use store::{AssetStore, JsonFileStore, MemoryStore, StoreCall};
