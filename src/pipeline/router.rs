//! Router stage: classify the latest turn.
//!
//! An LLM tool call decides whether the turn can be answered directly
//! (smalltalk, arithmetic, general knowledge) or needs the research
//! workflow over the data stores. Routing failures fall back to the
//! research workflow rather than raising; the clarifier can still rescue
//! the request.

use crate::context::ExecutionContext;
use crate::conversation::Conversation;
use crate::error::AegisResult;
use crate::llm::{parse_tool_arguments, ChatMessage, LlmClient, LlmParams, ToolDefinition};
use crate::logging::{log_debug, log_warn};
use crate::prompts::PromptRegistry;
use crate::settings::Settings;
use serde::Deserialize;

/// Router outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Answer directly; no data stores involved.
    DirectResponse,
    /// Run the research workflow.
    ResearchWorkflow,
}

#[derive(Debug, Deserialize)]
struct RouterArguments {
    response_type: String,
}

/// Classify the latest turn.
///
/// Never raises for LLM or prompt failures; those log and default to the
/// research workflow.
pub async fn route(
    conversation: &Conversation,
    llm: &dyn LlmClient,
    prompts: &PromptRegistry,
    settings: &Settings,
    ctx: &ExecutionContext,
) -> RouteDecision {
    match route_inner(conversation, llm, prompts, settings, ctx).await {
        Ok(decision) => decision,
        Err(e) => {
            log_warn!(
                execution_id = %ctx.execution_id,
                error = %e,
                "Router failed; defaulting to research workflow"
            );
            RouteDecision::ResearchWorkflow
        }
    }
}

async fn route_inner(
    conversation: &Conversation,
    llm: &dyn LlmClient,
    prompts: &PromptRegistry,
    settings: &Settings,
    ctx: &ExecutionContext,
) -> AegisResult<RouteDecision> {
    let prompt = prompts.load_prompt("router", "route_query", true, ctx).await?;

    let mut messages = vec![ChatMessage::system(prompt.system_prompt)];
    for message in &conversation.messages {
        let content = message.content.clone();
        messages.push(match message.role.as_str() {
            "assistant" => ChatMessage::assistant(content),
            _ => ChatMessage::user(content),
        });
    }

    let tool = ToolDefinition {
        name: "route_query".to_string(),
        description: "Classify the latest user turn".to_string(),
        parameters: prompt.tool_definition.unwrap_or_else(default_router_schema),
    };

    let params = LlmParams::for_model(&settings.llm.small.model).temperature(0.0);
    let completion = llm.complete_with_tools(&messages, &[tool], ctx, &params).await?;

    let Some(call) = completion.first_tool_call() else {
        log_warn!(
            execution_id = %ctx.execution_id,
            "Router returned no tool call; defaulting to research workflow"
        );
        return Ok(RouteDecision::ResearchWorkflow);
    };

    let arguments: RouterArguments = parse_tool_arguments(&call.arguments)?;
    log_debug!(
        execution_id = %ctx.execution_id,
        response_type = %arguments.response_type,
        "Router decision"
    );

    Ok(match arguments.response_type.as_str() {
        "direct_response" => RouteDecision::DirectResponse,
        _ => RouteDecision::ResearchWorkflow,
    })
}

fn default_router_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "response_type": {
                "type": "string",
                "enum": ["direct_response", "research_workflow"],
                "description": "How the latest turn should be handled"
            }
        },
        "required": ["response_type"]
    })
}
