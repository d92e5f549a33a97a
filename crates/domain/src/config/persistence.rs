use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence (asset store + operation queue)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding `chats/<id>.json`.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,

    /// How long the persistence worker waits after the first queued
    /// operation before draining, so bursts of updates to the same chat
    /// coalesce into one write. `0` drains immediately.
    #[serde(default = "d_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            coalesce_window_ms: d_coalesce_window_ms(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}

fn d_coalesce_window_ms() -> u64 {
    25
}
