//! Conversation normalization.
//!
//! Raw conversation input arrives either as `{"messages": [...]}` or as a
//! bare message list. The normalizer validates structure, filters roles
//! against the configured allow-list, truncates to the most recent
//! history, and produces a short preview of the latest message for
//! telemetry.
//!
//! Normalizing an already-normalized conversation is a no-op.

use crate::error::{AegisError, AegisResult};
use crate::logging::{log_debug, log_warn};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};

/// Preview length for telemetry, in characters.
const PREVIEW_CHARS: usize = 50;

/// One raw conversation entry before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message role; validated against the allow-list.
    pub role: Option<String>,
    /// Message text.
    pub content: Option<String>,
}

/// Accepted input shapes: an object with a `messages` key, or a bare list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConversationInput {
    /// `{"messages": [...]}`.
    Wrapped {
        /// The message list.
        messages: Vec<RawMessage>,
    },
    /// A bare `[...]` list.
    Bare(Vec<RawMessage>),
}

impl ConversationInput {
    fn into_messages(self) -> Vec<RawMessage> {
        match self {
            ConversationInput::Wrapped { messages } => messages,
            ConversationInput::Bare(messages) => messages,
        }
    }
}

/// A validated, filtered, truncated message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role from the allow-list.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Normalized conversation ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Messages in original relative order, capped to the configured
    /// history length.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// The most recent message.
    ///
    /// Normalization guarantees at least one message, so this only returns
    /// `None` for a hand-built empty value.
    pub fn latest_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Telemetry preview of the latest message: at most 50 characters,
    /// with an ellipsis only when truncation actually occurred.
    pub fn latest_preview(&self) -> String {
        let Some(latest) = self.latest_message() else {
            return String::new();
        };
        let mut preview: String = latest.content.chars().take(PREVIEW_CHARS).collect();
        if latest.content.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        preview
    }
}

/// Validate, filter, and truncate a raw conversation.
///
/// # Errors
///
/// - [`AegisError::Content`] when an entry is missing `role` or `content`.
/// - [`AegisError::EmptyConversation`] when no messages survive filtering.
pub fn process_conversation(
    input: ConversationInput,
    settings: &Settings,
    execution_id: &str,
) -> AegisResult<Conversation> {
    let raw = input.into_messages();
    let original_count = raw.len();

    let mut validated = Vec::with_capacity(raw.len());
    for (index, message) in raw.into_iter().enumerate() {
        let (Some(role), Some(content)) = (message.role, message.content) else {
            return Err(AegisError::content(format!(
                "Message {index} is missing role or content"
            )));
        };
        validated.push(Message { role, content });
    }

    let filtered: Vec<Message> = validated
        .into_iter()
        .filter(|message| {
            if message.role == "system" {
                return settings.include_system_messages;
            }
            let allowed = settings.allowed_roles.iter().any(|r| r == &message.role);
            if !allowed {
                log_warn!(
                    execution_id = %execution_id,
                    role = %message.role,
                    "Dropping message with disallowed role"
                );
            }
            allowed
        })
        .collect();

    if filtered.is_empty() {
        log_warn!(
            execution_id = %execution_id,
            original_count = original_count,
            "No valid messages after filtering"
        );
        return Err(AegisError::EmptyConversation);
    }

    let cap = settings.max_history_length.max(1);
    let truncated: Vec<Message> = if filtered.len() > cap {
        filtered[filtered.len() - cap..].to_vec()
    } else {
        filtered
    };

    let conversation = Conversation { messages: truncated };
    log_debug!(
        execution_id = %execution_id,
        original_count = original_count,
        kept_count = conversation.messages.len(),
        preview = %conversation.latest_preview(),
        "Conversation processed"
    );

    Ok(conversation)
}
