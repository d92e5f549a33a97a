#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use cs_assets::MemoryStore;
use cs_domain::chat::{Chat, ChatMessage, MessageGroup};
use cs_domain::config::{AgentConfig, AnalysisConfig, Config, MaterialConfig, MaterialStatus};
use cs_domain::error::Result;
use cs_domain::stream::{BoxStream, StreamEvent};
use cs_domain::tool::Role;
use cs_mutation::Mutation;
use cs_providers::{ChatRequest, LlmProvider};
use cs_runtime::mutator::MirrorEnvelope;
use cs_runtime::state::AppState;

/// A provider that replays a fixed list of events, optionally hanging
/// afterwards instead of ending the stream.
pub struct ScriptedProvider {
    events: Mutex<Vec<Result<StreamEvent>>>,
    hang: bool,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events: Mutex::new(events.into_iter().map(Ok).collect()),
            hang: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn hanging(events: Vec<StreamEvent>) -> Self {
        Self {
            hang: true,
            ..Self::new(events)
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        use futures_util::StreamExt;

        self.requests.lock().push(req);
        let events = std::mem::take(&mut *self.events.lock());
        let head = futures_util::stream::iter(events);
        let stream: BoxStream<'static, Result<StreamEvent>> = if self.hang {
            Box::pin(head.chain(futures_util::stream::pending()))
        } else {
            Box::pin(head)
        };
        Ok(stream)
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

/// The first fragment of a `plan` call.
pub fn plan_call(arguments: &str) -> StreamEvent {
    StreamEvent::ToolCallDelta {
        index: 0,
        call_id: Some("call_1".into()),
        tool_name: Some("plan".into()),
        arguments: arguments.into(),
    }
}

pub fn analysis_config() -> AnalysisConfig {
    AnalysisConfig {
        agents: vec![
            AgentConfig {
                id: "assistant".into(),
                name: "Assistant".into(),
                usage: "Talks to the user".into(),
            },
            AgentConfig {
                id: "coder".into(),
                name: "Coder".into(),
                usage: "Writes code".into(),
            },
        ],
        materials: vec![
            MaterialConfig {
                id: "style_guide".into(),
                status: MaterialStatus::Enabled,
            },
            MaterialConfig {
                id: "api_docs".into(),
                status: MaterialStatus::Enabled,
            },
            MaterialConfig {
                id: "house_rules".into(),
                status: MaterialStatus::Forced,
            },
        ],
        ..Default::default()
    }
}

/// A chat where the user has just asked something.
pub fn seeded_chat() -> Chat {
    let mut chat = Chat::empty("c1");
    chat.message_groups.push(MessageGroup {
        id: "g_user".into(),
        role: Role::User,
        username: "ada".into(),
        messages: vec![ChatMessage {
            id: "m_user".into(),
            content: "Write me a sorting function".into(),
            ..Default::default()
        }],
        ..Default::default()
    });
    chat
}

pub struct Harness {
    pub state: AppState,
    pub mirror_rx: mpsc::UnboundedReceiver<MirrorEnvelope>,
    pub store: Arc<MemoryStore>,
    pub seed: Chat,
}

impl Harness {
    pub fn new() -> Self {
        let seed = seeded_chat();
        let store = Arc::new(MemoryStore::new());
        store.insert(seed.clone());
        let config = Config {
            analysis: analysis_config(),
            ..Default::default()
        };
        let (state, mirror_rx) = AppState::in_memory(config, store.clone());
        Self {
            state,
            mirror_rx,
            store,
            seed,
        }
    }

    pub fn mirrored(&mut self) -> Vec<Mutation> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.mirror_rx.try_recv() {
            out.push(envelope.mutation);
        }
        out
    }

    pub fn chat(&self) -> Chat {
        self.state
            .engine
            .lock()
            .chat("c1")
            .cloned()
            .expect("chat c1 is loaded")
    }
}

/// Values of every `set_value` on `key`, in order.
pub fn set_values(mutations: &[Mutation], key: &str) -> Vec<serde_json::Value> {
    mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::SetValue { key: k, value, .. } if k == key => Some(value.clone()),
            _ => None,
        })
        .collect()
}
