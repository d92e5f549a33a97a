use cs_domain::error::Result;
use cs_domain::stream::{BoxStream, StreamEvent, Usage};
use cs_domain::tool::{Message, ToolCall, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Completion request and collected result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One completion call. Unset knobs fall back to the provider's configured
/// values.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    /// Force a call to this tool instead of letting the model decide.
    pub tool_choice: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
}

/// Everything a stream produced once it has been drained.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    /// Ordered by the stream's tool-call index.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backend able to stream a completion as [`StreamEvent`]s.
///
/// The HTTP request lives as long as the returned stream; dropping it is
/// how callers cancel.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// Name used in logs and errors.
    fn provider_id(&self) -> &str;

    fn default_model(&self) -> &str;
}
