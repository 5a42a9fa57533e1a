//! Clarifier stage: resolve banks, periods, and intent.
//!
//! Given the user query, the available databases, and the conversation,
//! an LLM tool call either asks for clarification or decomposes the
//! request into bank-period combinations, each with its own query intent
//! (different banks may carry different intents derived from the same
//! question). Every combination is validated against the data-availability
//! table for at least one of the selected databases; combinations with no
//! coverage are dropped with a warning.

use crate::context::ExecutionContext;
use crate::error::AegisResult;
use crate::fiscal::Quarter;
use crate::llm::{parse_tool_arguments, ChatMessage, LlmClient, LlmParams, ToolDefinition};
use crate::logging::{log_debug, log_warn};
use crate::prompts::PromptRegistry;
use crate::settings::Settings;
use crate::store::{AvailabilityCache, DatabaseId};
use serde::{Deserialize, Serialize};

/// One (bank, period, intent) tuple produced by the clarifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankPeriodCombination {
    /// Institution id.
    pub bank_id: i32,
    /// Display name.
    pub bank_name: String,
    /// Ticker symbol.
    pub bank_symbol: String,
    /// Fiscal year.
    pub fiscal_year: i32,
    /// Fiscal quarter.
    pub quarter: Quarter,
    /// What the user wants to know about this bank and period.
    pub query_intent: String,
}

/// Clarifier outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ClarifierOutcome {
    /// The request is under-specified; ask these questions.
    NeedsClarification(Vec<String>),
    /// The request decomposed into combinations with availability.
    Combinations(Vec<BankPeriodCombination>),
}

#[derive(Debug, Deserialize)]
struct ClarifierArguments {
    #[serde(default)]
    needs_clarification: bool,
    #[serde(default)]
    clarifying_questions: Vec<String>,
    #[serde(default)]
    bank_period_combinations: Vec<WireCombination>,
}

#[derive(Debug, Deserialize)]
struct WireCombination {
    bank_id: i32,
    bank_name: String,
    bank_symbol: String,
    fiscal_year: i32,
    quarter: String,
    query_intent: String,
}

/// Fallback questions when clarification is needed but the model supplied
/// none, or when the stage itself failed.
fn fallback_questions() -> Vec<String> {
    vec![
        "Which bank or banks are you asking about?".to_string(),
        "Which fiscal year and quarter should I look at?".to_string(),
    ]
}

/// Resolve the request into bank-period combinations.
///
/// Never raises: failures fall back to clarification questions.
pub async fn clarify(
    latest_message: &str,
    conversation_context: &str,
    databases: &[DatabaseId],
    availability: &AvailabilityCache,
    llm: &dyn LlmClient,
    prompts: &PromptRegistry,
    settings: &Settings,
    ctx: &ExecutionContext,
) -> ClarifierOutcome {
    match clarify_inner(
        latest_message,
        conversation_context,
        databases,
        availability,
        llm,
        prompts,
        settings,
        ctx,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            log_warn!(
                execution_id = %ctx.execution_id,
                error = %e,
                "Clarifier failed; asking for clarification"
            );
            ClarifierOutcome::NeedsClarification(fallback_questions())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn clarify_inner(
    latest_message: &str,
    conversation_context: &str,
    databases: &[DatabaseId],
    availability: &AvailabilityCache,
    llm: &dyn LlmClient,
    prompts: &PromptRegistry,
    settings: &Settings,
    ctx: &ExecutionContext,
) -> AegisResult<ClarifierOutcome> {
    let prompt = prompts.load_prompt("clarifier", "clarify_query", true, ctx).await?;
    let catalog = availability.catalog_text().await?;

    let database_list =
        databases.iter().map(DatabaseId::as_str).collect::<Vec<_>>().join(", ");
    let user_text = format!(
        "User question: {latest_message}\n\n\
         Conversation so far:\n{conversation_context}\n\n\
         Selected databases: {database_list}\n\n\
         Available data:\n{catalog}"
    );

    let messages =
        vec![ChatMessage::system(prompt.system_prompt), ChatMessage::user(user_text)];

    let tool = ToolDefinition {
        name: "clarify_query".to_string(),
        description: "Decompose the question into bank-period combinations or ask for \
                      clarification"
            .to_string(),
        parameters: prompt.tool_definition.unwrap_or_else(default_clarifier_schema),
    };

    let params = LlmParams::for_model(&settings.llm.medium.model).temperature(0.0);
    let completion = llm.complete_with_tools(&messages, &[tool], ctx, &params).await?;

    let Some(call) = completion.first_tool_call() else {
        return Ok(ClarifierOutcome::NeedsClarification(fallback_questions()));
    };
    let arguments: ClarifierArguments = parse_tool_arguments(&call.arguments)?;

    if arguments.needs_clarification {
        let questions = if arguments.clarifying_questions.is_empty() {
            fallback_questions()
        } else {
            arguments.clarifying_questions
        };
        return Ok(ClarifierOutcome::NeedsClarification(questions));
    }

    let mut combinations = Vec::with_capacity(arguments.bank_period_combinations.len());
    for wire in arguments.bank_period_combinations {
        let Some(quarter) = Quarter::parse(&wire.quarter) else {
            log_warn!(
                execution_id = %ctx.execution_id,
                quarter = %wire.quarter,
                "Clarifier produced a malformed quarter; dropping combination"
            );
            continue;
        };

        let available = availability
            .is_available(wire.bank_id, wire.fiscal_year, quarter, databases)
            .await?;
        if !available {
            log_warn!(
                execution_id = %ctx.execution_id,
                bank_id = wire.bank_id,
                fiscal_year = wire.fiscal_year,
                quarter = %quarter,
                "Combination has no availability for the selected databases; dropping"
            );
            continue;
        }

        combinations.push(BankPeriodCombination {
            bank_id: wire.bank_id,
            bank_name: wire.bank_name,
            bank_symbol: wire.bank_symbol,
            fiscal_year: wire.fiscal_year,
            quarter,
            query_intent: wire.query_intent,
        });
    }

    if combinations.is_empty() {
        return Ok(ClarifierOutcome::NeedsClarification(fallback_questions()));
    }

    log_debug!(
        execution_id = %ctx.execution_id,
        combination_count = combinations.len(),
        "Clarifier resolved combinations"
    );
    Ok(ClarifierOutcome::Combinations(combinations))
}

fn default_clarifier_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "needs_clarification": {"type": "boolean"},
            "clarifying_questions": {
                "type": "array",
                "items": {"type": "string"}
            },
            "bank_period_combinations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "bank_id": {"type": "integer"},
                        "bank_name": {"type": "string"},
                        "bank_symbol": {"type": "string"},
                        "fiscal_year": {"type": "integer"},
                        "quarter": {"type": "string", "enum": ["Q1", "Q2", "Q3", "Q4"]},
                        "query_intent": {"type": "string"}
                    },
                    "required": [
                        "bank_id", "bank_name", "bank_symbol",
                        "fiscal_year", "quarter", "query_intent"
                    ]
                }
            }
        },
        "required": ["needs_clarification"]
    })
}
