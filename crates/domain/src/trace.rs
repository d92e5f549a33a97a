use serde::Serialize;

/// Structured trace events emitted across all chatsync crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    MutationApplied {
        chat_id: String,
        kind: &'static str,
        reference: String,
    },
    MutationRejected {
        reference: String,
        kind: &'static str,
        error: String,
    },
    PersistenceWrite {
        asset_id: String,
        operation: &'static str,
        coalesced: usize,
        duration_ms: u64,
    },
    ReloadSuppressed {
        asset_id: String,
        generation: u64,
    },
    AnalysisStarted {
        chat_id: String,
        message_group_id: String,
    },
    AnalysisFinished {
        chat_id: String,
        message_group_id: String,
        agent_id: String,
        outcome: &'static str,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cs_event");
    }
}
