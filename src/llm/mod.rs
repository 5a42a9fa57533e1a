//! LLM connector: uniform complete / stream / tool-call / embed operations.
//!
//! The [`LlmClient`](connector::LlmClient) trait is the seam between the
//! pipeline/ETL layers and the provider. The production implementation,
//! [`OpenAiCompatibleConnector`](connector::OpenAiCompatibleConnector),
//! speaks the OpenAI chat-completions wire protocol with retries, cost
//! accounting, and bearer-auth injection; tests substitute scripted
//! implementations of the trait.

pub mod connector;
pub mod retry;
pub mod types;
pub(crate) mod wire;

pub use connector::{LlmClient, OpenAiCompatibleConnector};
pub use retry::RetryPolicy;
pub use types::{
    parse_tool_arguments, AssistantMessage, ChatCompletion, ChatMessage, Choice, LlmParams, Role,
    ToolCallPayload, ToolDefinition, Usage,
};
