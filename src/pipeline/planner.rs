//! Planner stage: select databases and shape per-database intent.
//!
//! Given the resolved combinations and the databases available to the
//! request, an LLM tool call picks the subset worth querying and attaches
//! a short and a full intent string to each. Planner failures fall back to
//! querying every available database with the raw question as intent.

use super::clarifier::BankPeriodCombination;
use crate::context::ExecutionContext;
use crate::error::AegisResult;
use crate::llm::{parse_tool_arguments, ChatMessage, LlmClient, LlmParams, ToolDefinition};
use crate::logging::{log_debug, log_warn};
use crate::prompts::PromptRegistry;
use crate::settings::Settings;
use crate::store::DatabaseId;
use serde::{Deserialize, Serialize};

/// One database selected for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabasePlan {
    /// The database to query.
    pub database_id: DatabaseId,
    /// One-line intent for telemetry and subagent framing.
    pub basic_intent: String,
    /// Full intent paragraph handed to the subagent.
    pub full_intent: String,
}

#[derive(Debug, Deserialize)]
struct PlannerArguments {
    #[serde(default)]
    databases: Vec<WirePlan>,
}

#[derive(Debug, Deserialize)]
struct WirePlan {
    database_id: String,
    #[serde(default)]
    basic_intent: String,
    #[serde(default)]
    full_intent: String,
}

/// Select the databases to dispatch.
///
/// Never raises: failures fall back to all available databases.
pub async fn plan(
    latest_message: &str,
    combinations: &[BankPeriodCombination],
    databases: &[DatabaseId],
    llm: &dyn LlmClient,
    prompts: &PromptRegistry,
    settings: &Settings,
    ctx: &ExecutionContext,
) -> Vec<DatabasePlan> {
    match plan_inner(latest_message, combinations, databases, llm, prompts, settings, ctx).await
    {
        Ok(plans) if !plans.is_empty() => plans,
        Ok(_) => fallback_plans(latest_message, databases),
        Err(e) => {
            log_warn!(
                execution_id = %ctx.execution_id,
                error = %e,
                "Planner failed; dispatching all available databases"
            );
            fallback_plans(latest_message, databases)
        }
    }
}

fn fallback_plans(latest_message: &str, databases: &[DatabaseId]) -> Vec<DatabasePlan> {
    databases
        .iter()
        .map(|db| DatabasePlan {
            database_id: *db,
            basic_intent: latest_message.chars().take(80).collect(),
            full_intent: latest_message.to_string(),
        })
        .collect()
}

async fn plan_inner(
    latest_message: &str,
    combinations: &[BankPeriodCombination],
    databases: &[DatabaseId],
    llm: &dyn LlmClient,
    prompts: &PromptRegistry,
    settings: &Settings,
    ctx: &ExecutionContext,
) -> AegisResult<Vec<DatabasePlan>> {
    let prompt = prompts.load_prompt("planner", "plan_databases", true, ctx).await?;

    let combinations_text = combinations
        .iter()
        .map(|c| {
            format!(
                "- {} ({}) FY{} {}: {}",
                c.bank_name, c.bank_symbol, c.fiscal_year, c.quarter, c.query_intent
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let database_list =
        databases.iter().map(DatabaseId::as_str).collect::<Vec<_>>().join(", ");

    let user_text = format!(
        "User question: {latest_message}\n\n\
         Resolved combinations:\n{combinations_text}\n\n\
         Available databases: {database_list}"
    );

    let messages =
        vec![ChatMessage::system(prompt.system_prompt), ChatMessage::user(user_text)];

    let tool = ToolDefinition {
        name: "plan_databases".to_string(),
        description: "Select the databases to query and the intent for each".to_string(),
        parameters: prompt.tool_definition.unwrap_or_else(default_planner_schema),
    };

    let params = LlmParams::for_model(&settings.llm.small.model).temperature(0.0);
    let completion = llm.complete_with_tools(&messages, &[tool], ctx, &params).await?;

    let Some(call) = completion.first_tool_call() else {
        return Ok(Vec::new());
    };
    let arguments: PlannerArguments = parse_tool_arguments(&call.arguments)?;

    let plans: Vec<DatabasePlan> = arguments
        .databases
        .into_iter()
        .filter_map(|wire| {
            let Some(database_id) = DatabaseId::parse(&wire.database_id) else {
                log_warn!(
                    execution_id = %ctx.execution_id,
                    database_id = %wire.database_id,
                    "Planner selected an unknown database; dropping"
                );
                return None;
            };
            if !databases.contains(&database_id) {
                log_warn!(
                    execution_id = %ctx.execution_id,
                    database_id = %database_id,
                    "Planner selected a database outside the available set; dropping"
                );
                return None;
            }
            Some(DatabasePlan {
                database_id,
                basic_intent: if wire.basic_intent.is_empty() {
                    latest_message.chars().take(80).collect()
                } else {
                    wire.basic_intent
                },
                full_intent: if wire.full_intent.is_empty() {
                    latest_message.to_string()
                } else {
                    wire.full_intent
                },
            })
        })
        .collect();

    log_debug!(
        execution_id = %ctx.execution_id,
        plan_count = plans.len(),
        "Planner selected databases"
    );
    Ok(plans)
}

fn default_planner_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "databases": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "database_id": {
                            "type": "string",
                            "enum": ["transcripts", "benchmarking", "reports", "rts", "pillar3"]
                        },
                        "basic_intent": {"type": "string"},
                        "full_intent": {"type": "string"}
                    },
                    "required": ["database_id"]
                }
            }
        },
        "required": ["databases"]
    })
}
