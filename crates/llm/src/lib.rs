mod gemini;
mod provider;
pub mod wire;

pub use gemini::{
    CODEGEN_THINKING_BUDGET, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_CODEGEN_MODEL,
    GeminiClient, GeminiConfig,
};
pub use provider::{
    BoxFuture, Citation, LlmProvider, ProviderError, ProviderEventStream, ProviderMessage,
    ProviderResult, ProviderStreamHandle, ProviderWorker, ResponseFragment, Role, StreamEvent,
    StreamRequest, make_event_stream,
};
