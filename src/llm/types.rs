//! Message and response types for the LLM connector.
//!
//! These mirror the OpenAI chat-completions shapes closely enough that
//! callers can pattern-match `choices[0].message` for either prose content
//! or tool calls. Tool-call `arguments` stay raw JSON strings; callers
//! decode them with [`parse_tool_arguments`], which strips surrounding
//! whitespace first (some providers prepend a newline).

use crate::error::{AegisError, AegisResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction.
    System,
    /// End-user turn.
    User,
    /// Model turn.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// Assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Per-call model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmParams {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion token cap.
    pub max_tokens: u32,
}

impl LlmParams {
    /// Parameters for a model with the usual defaults.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self { model: model.into(), temperature: 0.7, max_tokens: 4096 }
    }

    /// Override the temperature.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the completion token cap.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Tool made available to a tool-call request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within a request.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool invocation returned by the model.
///
/// `arguments` is the raw JSON string from the wire; it may carry leading
/// or trailing whitespace. Decode with [`parse_tool_arguments`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    /// Provider-assigned call id.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Raw JSON argument string.
    pub arguments: String,
}

/// `choices[n].message` of a completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Prose content, when the model answered in text.
    pub content: Option<String>,
    /// Tool calls, when the model invoked tools.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallPayload>,
}

/// One completion choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// The assistant message for this choice.
    pub message: AssistantMessage,
}

/// Token usage reported by the provider.
///
/// The provider's usage schema is not fixed; absent fields default to zero
/// and never fail deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens.
    #[serde(default)]
    pub total_tokens: u64,
}

/// Response from `complete` and `complete_with_tools`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Completion choices; the first is the answer.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Usage accounting, when the provider reported it.
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Prose content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.content.as_deref())
    }

    /// First tool call of the first choice, if any.
    pub fn first_tool_call(&self) -> Option<&ToolCallPayload> {
        self.choices.first().and_then(|c| c.message.tool_calls.first())
    }
}

/// Decode a tool-call argument string into a typed value.
///
/// Surrounding whitespace is stripped before decoding; a payload arriving
/// with a single leading newline must parse. A payload that still fails to
/// decode is a [`AegisError::Content`] for the caller to classify.
pub fn parse_tool_arguments<T: DeserializeOwned>(raw: &str) -> AegisResult<T> {
    let trimmed = raw.trim();
    serde_json::from_str(trimmed)
        .map_err(|e| AegisError::content(format!("Tool-call arguments failed to decode: {e}")))
}
