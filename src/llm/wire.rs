//! OpenAI-compatible wire payloads.
//!
//! Request and response bodies for the chat-completions, embeddings, and
//! SSE streaming endpoints. Kept crate-private; the public surface is in
//! [`super::types`].

use super::types::{
    AssistantMessage, ChatCompletion, ChatMessage, Choice, ToolCallPayload, ToolDefinition, Usage,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireToolFunction,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function".to_string(),
            function: WireToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireChatResponse {
    #[serde(default)]
    pub choices: Vec<WireChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireChoice {
    pub message: WireChoiceMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireChoiceMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default)]
    pub id: String,
    pub function: WireFunctionCall,
}

/// `arguments` stays a raw string; decoding is the caller's concern.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl From<WireChatResponse> for ChatCompletion {
    fn from(wire: WireChatResponse) -> Self {
        let choices = wire
            .choices
            .into_iter()
            .map(|c| Choice {
                message: AssistantMessage {
                    content: c.message.content,
                    tool_calls: c
                        .message
                        .tool_calls
                        .into_iter()
                        .map(|tc| ToolCallPayload {
                            id: tc.id,
                            name: tc.function.name,
                            arguments: tc.function.arguments,
                        })
                        .collect(),
                },
            })
            .collect();
        Self { choices, usage: wire.usage }
    }
}

/// One SSE chunk of a streamed completion.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireStreamChunk {
    #[serde(default)]
    pub choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireStreamChoice {
    #[serde(default)]
    pub delta: WireStreamDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireStreamDelta {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireEmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireEmbeddingResponse {
    #[serde(default)]
    pub data: Vec<WireEmbeddingRow>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireEmbeddingRow {
    pub embedding: Vec<f32>,
}
