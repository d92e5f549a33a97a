use cs_assets::{AssetStore, OperationQueue};
use cs_domain::chat::Chat;
use cs_domain::error::Result;
use cs_domain::trace::TraceEvent;

use crate::apply::Graph;
use crate::mutation::Mutation;

/// Authoritative graph plus the queue its persistence intents go to.
///
/// `apply` is synchronous: the graph is updated and the intent queued
/// before it returns. Storage catches up in the background.
pub struct MutationEngine {
    graph: Graph,
    queue: OperationQueue,
}

impl MutationEngine {
    pub fn new(queue: OperationQueue) -> Self {
        Self {
            graph: Graph::new(),
            queue,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    /// Register an already-persisted chat. Nothing is queued.
    pub fn load(&mut self, chat: Chat) {
        self.graph.insert(chat);
    }

    pub fn chat(&self, id: &str) -> Option<&Chat> {
        self.graph.get(id)
    }

    /// Make a stored chat available to mutations. No-op when it is already
    /// in memory; returns whether the chat is available afterwards.
    pub fn ensure_loaded(&mut self, store: &dyn AssetStore, id: &str) -> bool {
        if self.graph.contains(id) {
            return true;
        }
        match store.get_asset(id) {
            Some(chat) => {
                tracing::debug!(chat_id = %id, "loaded chat into graph");
                self.graph.insert(chat);
                true
            }
            None => false,
        }
    }

    pub fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        match self.graph.apply(mutation) {
            Ok(operation) => {
                TraceEvent::MutationApplied {
                    chat_id: operation.asset_id().to_owned(),
                    kind: mutation.kind(),
                    reference: mutation.reference().to_string(),
                }
                .emit();
                self.queue.enqueue(operation);
                Ok(())
            }
            Err(e) => {
                TraceEvent::MutationRejected {
                    reference: mutation.reference().to_string(),
                    kind: mutation.kind(),
                    error: e.to_string(),
                }
                .emit();
                Err(e)
            }
        }
    }
}
