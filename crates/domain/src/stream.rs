use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Pinned, boxed, `Send` stream; the shape providers hand back.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Normalized completion stream item.
///
/// Tool-call fragments are keyed by the stream-assigned `index`; the id and
/// function name usually arrive only on the first fragment of an index.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Free-text content.
    #[serde(rename = "token")]
    Token { text: String },

    /// Partial tool call for slot `index`.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta {
        index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        arguments: String,
    },

    /// Terminal event.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// Error reported inside the stream by the backend.
    #[serde(rename = "error")]
    Error { message: String },
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        StreamEvent::Token { text: text.into() }
    }

    /// A bare argument fragment for an already-announced tool call.
    pub fn arguments(index: usize, fragment: impl Into<String>) -> Self {
        StreamEvent::ToolCallDelta {
            index,
            call_id: None,
            tool_name: None,
            arguments: fragment.into(),
        }
    }

    pub fn done() -> Self {
        StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        }
    }
}

/// Token usage for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
