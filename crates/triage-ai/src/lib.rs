//! LLM provider client used by the triage assistant.
mod anthropic;
mod retry;
mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
    StreamDeltaHandler, ToolCall, ToolDefinition, TriageAiError,
};
