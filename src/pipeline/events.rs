//! Streaming event schema shared by every pipeline stage.
//!
//! Every stage emits events of the shape `{type, name, content}`.
//! Consumers concatenate `content` within a stable (type, name) pair to
//! form the visible text for that stage. Within a single (type, name) the
//! stream preserves emission order, and each subagent's chunks appear
//! contiguously.

use serde::{Deserialize, Serialize};

/// Name used for pipeline-level events.
pub const AGENT_NAME: &str = "aegis";

/// One streamed pipeline event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Text from the pipeline itself: router direct answers, clarifying
    /// questions, summarizer output, and user-facing errors.
    #[serde(rename = "agent")]
    AgentChunk {
        /// Always [`AGENT_NAME`] for pipeline text.
        name: String,
        /// Text fragment.
        content: String,
    },
    /// A subagent is about to stream.
    SubagentStart {
        /// Database id of the subagent.
        name: String,
        /// Introductory text (may be empty).
        content: String,
    },
    /// Text from one subagent.
    #[serde(rename = "subagent")]
    SubagentChunk {
        /// Database id of the subagent.
        name: String,
        /// Text fragment.
        content: String,
    },
    /// The summarizer is about to stream.
    SummarizerStart {
        /// Always [`AGENT_NAME`].
        name: String,
        /// Introductory text (may be empty).
        content: String,
    },
}

impl PipelineEvent {
    /// Pipeline text tagged with [`AGENT_NAME`].
    pub fn agent(content: impl Into<String>) -> Self {
        PipelineEvent::AgentChunk { name: AGENT_NAME.to_string(), content: content.into() }
    }

    /// Start marker for a subagent.
    pub fn subagent_start(name: impl Into<String>) -> Self {
        PipelineEvent::SubagentStart { name: name.into(), content: String::new() }
    }

    /// Text fragment from a subagent.
    pub fn subagent(name: impl Into<String>, content: impl Into<String>) -> Self {
        PipelineEvent::SubagentChunk { name: name.into(), content: content.into() }
    }

    /// Start marker for the summarizer.
    pub fn summarizer_start() -> Self {
        PipelineEvent::SummarizerStart { name: AGENT_NAME.to_string(), content: String::new() }
    }

    /// Wire `type` string of this event.
    pub fn kind_label(&self) -> &'static str {
        match self {
            PipelineEvent::AgentChunk { .. } => "agent",
            PipelineEvent::SubagentStart { .. } => "subagent_start",
            PipelineEvent::SubagentChunk { .. } => "subagent",
            PipelineEvent::SummarizerStart { .. } => "summarizer_start",
        }
    }

    /// Event name.
    pub fn name(&self) -> &str {
        match self {
            PipelineEvent::AgentChunk { name, .. }
            | PipelineEvent::SubagentStart { name, .. }
            | PipelineEvent::SubagentChunk { name, .. }
            | PipelineEvent::SummarizerStart { name, .. } => name,
        }
    }

    /// Event content.
    pub fn content(&self) -> &str {
        match self {
            PipelineEvent::AgentChunk { content, .. }
            | PipelineEvent::SubagentStart { content, .. }
            | PipelineEvent::SubagentChunk { content, .. }
            | PipelineEvent::SummarizerStart { content, .. } => content,
        }
    }
}
