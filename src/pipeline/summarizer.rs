//! Summarizer stage: fuse subagent outputs into the final answer.
//!
//! Receives every subagent's synthesized text plus the original question
//! and streams a single fused answer. The output contains no raw chunks,
//! no database field names, and no internal group identifiers; those rules
//! live in the summarizer prompt, and the subagents have already scrubbed
//! identifiers from their own output.

use crate::context::ExecutionContext;
use crate::error::AegisResult;
use crate::llm::connector::DeltaStream;
use crate::llm::{ChatMessage, LlmClient, LlmParams};
use crate::logging::log_warn;
use crate::prompts::PromptRegistry;
use crate::settings::Settings;

/// Stream the fused answer over the subagent outputs.
///
/// Failures surface as `Err` so the pipeline can emit its user-facing
/// fallback; the summarizer itself never fabricates content.
pub async fn summarize(
    latest_message: &str,
    subagent_outputs: &[(String, String)],
    llm: &dyn LlmClient,
    prompts: &PromptRegistry,
    settings: &Settings,
    ctx: &ExecutionContext,
) -> AegisResult<DeltaStream> {
    let prompt = prompts.load_prompt("summarizer", "synthesize_answer", true, ctx).await?;

    let sources = subagent_outputs
        .iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(database, text)| format!("## Findings from {database}\n\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    if sources.is_empty() {
        log_warn!(
            execution_id = %ctx.execution_id,
            "Summarizer received no subagent content"
        );
    }

    let user_text = format!(
        "Original question: {latest_message}\n\n\
         Research findings:\n\n{sources}"
    );

    let messages =
        vec![ChatMessage::system(prompt.system_prompt), ChatMessage::user(user_text)];
    let params = LlmParams::for_model(&settings.llm.large.model).temperature(0.3);

    llm.stream(&messages, ctx, &params).await
}
