pub mod openai_compat;
pub mod partial_json;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatProvider;
pub use partial_json::{close_partial, decode_partial, decode_partial_status, PartialObject};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
