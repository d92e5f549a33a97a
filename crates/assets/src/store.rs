//! Asset storage capability and its implementations.
//!
//! Only the persistence worker calls the write methods; everything else
//! reads through [`AssetStore::get_asset`] when a chat is first loaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use cs_domain::chat::{validate_chat_id, Chat};
use cs_domain::error::{Error, Result};

use crate::notify::Notifications;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    /// Current stored version of a chat.
    fn get_asset(&self, id: &str) -> Option<Chat>;

    async fn create_asset(&self, chat: Chat) -> Result<()>;

    /// Replace the stored chat `id` with `chat`. When `chat.id` differs
    /// from `id` the asset is renamed.
    async fn update_asset(&self, id: &str, chat: Chat) -> Result<()>;

    async fn delete_asset(&self, id: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One write observed by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub operation: &'static str,
    pub asset_id: String,
}

/// Volatile store that records every write it receives.
#[derive(Default)]
pub struct MemoryStore {
    assets: RwLock<HashMap<String, Chat>>,
    calls: Mutex<Vec<StoreCall>>,
    notifications: Option<Arc<Notifications>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire a reload notification after every write, as a file watcher would.
    pub fn with_notifications(mut self, notifications: Arc<Notifications>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Seed a chat without recording a call.
    pub fn insert(&self, chat: Chat) {
        self.assets.write().insert(chat.id.clone(), chat);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    fn record(&self, operation: &'static str, asset_id: &str) {
        self.calls.lock().push(StoreCall {
            operation,
            asset_id: asset_id.to_owned(),
        });
        if let Some(n) = &self.notifications {
            n.reload(asset_id);
        }
    }
}

#[async_trait::async_trait]
impl AssetStore for MemoryStore {
    fn get_asset(&self, id: &str) -> Option<Chat> {
        self.assets.read().get(id).cloned()
    }

    async fn create_asset(&self, chat: Chat) -> Result<()> {
        let id = chat.id.clone();
        self.assets.write().insert(id.clone(), chat);
        self.record("create", &id);
        Ok(())
    }

    async fn update_asset(&self, id: &str, chat: Chat) -> Result<()> {
        {
            let mut assets = self.assets.write();
            if !assets.contains_key(id) {
                return Err(Error::AssetNotFound(id.to_owned()));
            }
            if chat.id != id {
                assets.remove(id);
            }
            assets.insert(chat.id.clone(), chat);
        }
        self.record("update", id);
        Ok(())
    }

    async fn delete_asset(&self, id: &str) -> Result<()> {
        if self.assets.write().remove(id).is_none() {
            return Err(Error::AssetNotFound(id.to_owned()));
        }
        self.record("delete", id);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON file store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Chats persisted as `<state_path>/chats/<id>.json` with an in-memory
/// write-through cache so reads never hit disk after startup.
pub struct JsonFileStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Chat>>,
    notifications: Option<Arc<Notifications>>,
}

impl JsonFileStore {
    /// Load or create the store under `state_path/chats`.
    pub fn open(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("chats");
        std::fs::create_dir_all(&dir)?;

        let mut cache = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Chat>(&raw) {
                Ok(chat) if validate_chat_id(&chat.id).is_ok() => {
                    cache.insert(chat.id.clone(), chat);
                }
                Ok(chat) => {
                    tracing::warn!(
                        path = %path.display(),
                        chat_id = %chat.id,
                        "skipping chat file with an unusable id"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable chat file"
                    );
                }
            }
        }

        tracing::info!(
            chats = cache.len(),
            path = %dir.display(),
            "chat store loaded"
        );

        Ok(Self {
            dir,
            cache: RwLock::new(cache),
            notifications: None,
        })
    }

    pub fn with_notifications(mut self, notifications: Arc<Notifications>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// `<dir>/<id>.json`. Ids that would leave `dir` are refused.
    fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_chat_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }

    fn notify(&self, id: &str) {
        if let Some(n) = &self.notifications {
            n.reload(id);
        }
    }

    /// Serialize and write on a blocking thread; the temp file + rename
    /// keeps readers from ever seeing a half-written chat.
    async fn write_chat(&self, chat: &Chat) -> Result<()> {
        let json = serde_json::to_string_pretty(chat)?;
        let path = self.path_for(&chat.id)?;

        tokio::task::spawn_blocking(move || {
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, json.as_bytes())?;
            std::fs::rename(&tmp, &path)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        Ok(())
    }

    async fn remove_file(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }
}

#[async_trait::async_trait]
impl AssetStore for JsonFileStore {
    fn get_asset(&self, id: &str) -> Option<Chat> {
        self.cache.read().get(id).cloned()
    }

    async fn create_asset(&self, chat: Chat) -> Result<()> {
        // Disk first; the cache only reflects successful writes.
        self.write_chat(&chat).await?;
        let id = chat.id.clone();
        self.cache.write().insert(id.clone(), chat);
        self.notify(&id);
        Ok(())
    }

    async fn update_asset(&self, id: &str, chat: Chat) -> Result<()> {
        if !self.cache.read().contains_key(id) {
            return Err(Error::AssetNotFound(id.to_owned()));
        }
        self.write_chat(&chat).await?;
        if chat.id != id {
            self.remove_file(id).await?;
            self.cache.write().remove(id);
        }
        self.cache.write().insert(chat.id.clone(), chat);
        self.notify(id);
        Ok(())
    }

    async fn delete_asset(&self, id: &str) -> Result<()> {
        if !self.cache.read().contains_key(id) {
            return Err(Error::AssetNotFound(id.to_owned()));
        }
        self.remove_file(id).await?;
        self.cache.write().remove(id);
        self.notify(id);
        Ok(())
    }
}
