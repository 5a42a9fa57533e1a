//! Interactive agent pipeline.
//!
//! Router, clarifier, planner, subagent dispatch, and summarizer over a
//! single streaming event schema. The pipeline is sequential across
//! stages; subagent dispatch fans out concurrently, and subagent outputs
//! merge into the stream in the order their first chunk arrives, each
//! appearing contiguously.
//!
//! Stage failures never raise out of the pipeline: they stream a
//! user-facing explanation as an `agent`/`aegis` event and record an error
//! monitor entry.

pub mod clarifier;
pub mod events;
pub mod planner;
pub mod router;
pub mod summarizer;

pub use clarifier::{BankPeriodCombination, ClarifierOutcome};
pub use events::{PipelineEvent, AGENT_NAME};
pub use planner::DatabasePlan;
pub use router::RouteDecision;

use crate::assistant::Aegis;
use crate::auth::setup_authentication;
use crate::context::ExecutionContext;
use crate::conversation::{process_conversation, Conversation, ConversationInput};
use crate::llm::{ChatMessage, LlmParams};
use crate::logging::{log_debug, log_info, log_warn};
use crate::monitor::{StageRecord, StageStatus};
use crate::store::DatabaseId;
use crate::subagents::SubagentRequest;
use futures_util::future::select_all;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Channel depth for the outward event stream.
pub(crate) const EVENT_CHANNEL_DEPTH: usize = 128;

/// Run the pipeline, sending events until completion or consumer drop.
pub(crate) async fn run(
    aegis: Aegis,
    input: ConversationInput,
    db_names: Option<Vec<String>>,
    tx: mpsc::Sender<PipelineEvent>,
) {
    let execution_id = Uuid::new_v4();
    log_info!(execution_id = %execution_id, "workflow.started");

    // Auth is resolved per request; SSL was resolved once at startup.
    let auth_started = Instant::now();
    let auth = match setup_authentication(
        &execution_id.to_string(),
        &aegis.ssl,
        &aegis.settings,
    )
    .await
    {
        Ok(auth) => auth,
        Err(e) => {
            let _ = tx.send(PipelineEvent::agent(e.user_message())).await;
            return;
        }
    };

    let ctx = Arc::new(ExecutionContext::with_id(
        execution_id,
        auth,
        aegis.ssl.clone(),
        AGENT_NAME,
    ));

    ctx.monitor.add_entry(
        StageRecord::new("ssl_setup", StageStatus::Success)
            .metadata(serde_json::json!({"verify": ctx.ssl.verify})),
    );

    let auth_status =
        if ctx.auth.success { StageStatus::Success } else { StageStatus::Failure };
    let mut auth_record = StageRecord::new("authentication", auth_status)
        .duration_ms(auth_started.elapsed().as_millis() as u64)
        .metadata(serde_json::json!({"method": ctx.auth.method.as_str()}));
    if let Some(error) = &ctx.auth.error {
        auth_record = auth_record.error(error.clone());
    }
    ctx.monitor.add_entry(auth_record);

    if !ctx.auth.success {
        let _ = tx
            .send(PipelineEvent::agent(
                "Authentication failed. Please try again later",
            ))
            .await;
        flush_monitor(&aegis, &ctx).await;
        return;
    }

    // Conversation normalization.
    let conversation =
        match process_conversation(input, &aegis.settings, &execution_id.to_string()) {
            Ok(conversation) => {
                ctx.monitor.add_entry(
                    StageRecord::new("conversation_processing", StageStatus::Success).metadata(
                        serde_json::json!({
                            "message_count": conversation.messages.len(),
                            "preview": conversation.latest_preview(),
                        }),
                    ),
                );
                conversation
            }
            Err(e) => {
                ctx.monitor.add_entry(
                    StageRecord::new("conversation_processing", StageStatus::Failure)
                        .error(e.to_string()),
                );
                let _ = tx.send(PipelineEvent::agent(e.user_message())).await;
                flush_monitor(&aegis, &ctx).await;
                return;
            }
        };

    // Database filter.
    let databases = resolve_databases(db_names.as_deref());
    ctx.monitor.add_entry(
        StageRecord::new("filter_processing", StageStatus::Success).metadata(
            serde_json::json!({
                "db_names_requested": db_names,
                "filter_count": databases.len(),
            }),
        ),
    );

    run_stages(&aegis, &ctx, &conversation, &databases, &tx).await;
    flush_monitor(&aegis, &ctx).await;
}

/// Router onward. Extracted so every early return still flushes telemetry.
async fn run_stages(
    aegis: &Aegis,
    ctx: &Arc<ExecutionContext>,
    conversation: &Conversation,
    databases: &[DatabaseId],
    tx: &mpsc::Sender<PipelineEvent>,
) {
    let latest_message = conversation
        .latest_message()
        .map(|m| m.content.clone())
        .unwrap_or_default();

    // Router.
    let stage_started = Instant::now();
    let decision = router::route(
        conversation,
        aegis.llm.as_ref(),
        &aegis.prompts,
        &aegis.settings,
        ctx,
    )
    .await;
    record_stage(ctx, "router", stage_started, None);

    if decision == RouteDecision::DirectResponse {
        stream_direct_response(aegis, ctx, conversation, tx).await;
        return;
    }

    // Clarifier.
    let stage_started = Instant::now();
    let conversation_context = conversation
        .messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    let outcome = clarifier::clarify(
        &latest_message,
        &conversation_context,
        databases,
        &aegis.availability,
        aegis.llm.as_ref(),
        &aegis.prompts,
        &aegis.settings,
        ctx,
    )
    .await;
    record_stage(ctx, "clarifier", stage_started, None);

    let combinations = match outcome {
        ClarifierOutcome::NeedsClarification(questions) => {
            let text = format!(
                "I need a little more detail before I can research this:\n{}",
                questions
                    .iter()
                    .map(|q| format!("- {q}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
            let _ = tx.send(PipelineEvent::agent(text)).await;
            return;
        }
        ClarifierOutcome::Combinations(combinations) => combinations,
    };

    // Planner.
    let stage_started = Instant::now();
    let plans = planner::plan(
        &latest_message,
        &combinations,
        databases,
        aegis.llm.as_ref(),
        &aegis.prompts,
        &aegis.settings,
        ctx,
    )
    .await;
    record_stage(ctx, "planner", stage_started, None);

    if plans.is_empty() {
        let _ = tx
            .send(PipelineEvent::agent(
                "None of the available data sources cover this request.",
            ))
            .await;
        return;
    }

    // Subagent dispatch with contiguous merge. The dispatch-level entry
    // aggregates the connector ledger; each subagent also records its own
    // entry from the usage it observed.
    let stage_started = Instant::now();
    let subagent_outputs =
        dispatch_subagents(aegis, ctx, &latest_message, &combinations, &plans, tx).await;
    record_stage(ctx, "subagent_dispatch", stage_started, None);

    // Summarizer.
    let stage_started = Instant::now();
    if tx.send(PipelineEvent::summarizer_start()).await.is_err() {
        return;
    }
    match summarizer::summarize(
        &latest_message,
        &subagent_outputs,
        aegis.llm.as_ref(),
        &aegis.prompts,
        &aegis.settings,
        ctx,
    )
    .await
    {
        Ok(mut stream) => {
            while let Some(delta) = stream.next().await {
                match delta {
                    Ok(content) => {
                        if tx.send(PipelineEvent::agent(content)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        record_stage(ctx, "summarizer", stage_started, Some(e.to_string()));
                        let _ = tx.send(PipelineEvent::agent(e.user_message())).await;
                        return;
                    }
                }
            }
            record_stage(ctx, "summarizer", stage_started, None);
        }
        Err(e) => {
            record_stage(ctx, "summarizer", stage_started, Some(e.to_string()));
            let _ = tx.send(PipelineEvent::agent(e.user_message())).await;
        }
    }
}

/// Router chose the direct path: stream the answer and end the pipeline.
async fn stream_direct_response(
    aegis: &Aegis,
    ctx: &Arc<ExecutionContext>,
    conversation: &Conversation,
    tx: &mpsc::Sender<PipelineEvent>,
) {
    let stage_started = Instant::now();

    let result: crate::error::AegisResult<()> = async {
        let prompt =
            aegis.prompts.load_prompt("router", "direct_response", true, ctx).await?;
        let mut messages = vec![ChatMessage::system(prompt.system_prompt)];
        for message in &conversation.messages {
            messages.push(match message.role.as_str() {
                "assistant" => ChatMessage::assistant(message.content.clone()),
                _ => ChatMessage::user(message.content.clone()),
            });
        }
        let params =
            LlmParams::for_model(&aegis.settings.llm.medium.model).temperature(0.5);
        let mut stream = aegis.llm.stream(&messages, ctx, &params).await?;
        while let Some(delta) = stream.next().await {
            if tx.send(PipelineEvent::agent(delta?)).await.is_err() {
                break;
            }
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => record_stage(ctx, "direct_response", stage_started, None),
        Err(e) => {
            record_stage(ctx, "direct_response", stage_started, Some(e.to_string()));
            let _ = tx.send(PipelineEvent::agent(e.user_message())).await;
        }
    }
}

/// Fan subagents out concurrently and merge their streams.
///
/// Each subagent writes to its own channel; the merger forwards whichever
/// subagent produces its first chunk soonest, drains it to completion, and
/// moves to the next. Returns each subagent's concatenated text for the
/// summarizer.
async fn dispatch_subagents(
    aegis: &Aegis,
    ctx: &Arc<ExecutionContext>,
    latest_message: &str,
    combinations: &[BankPeriodCombination],
    plans: &[DatabasePlan],
    tx: &mpsc::Sender<PipelineEvent>,
) -> Vec<(String, String)> {
    let mut receivers: Vec<(String, mpsc::Receiver<PipelineEvent>)> = Vec::new();

    for plan in plans {
        let Some(subagent) = aegis.subagent_for(plan.database_id) else {
            log_warn!(
                execution_id = %ctx.execution_id,
                database_id = %plan.database_id,
                "No subagent registered for planned database; skipping"
            );
            continue;
        };

        let (sub_tx, sub_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let request = SubagentRequest {
            latest_message: latest_message.to_string(),
            combinations: combinations.to_vec(),
            basic_intent: plan.basic_intent.clone(),
            full_intent: plan.full_intent.clone(),
        };
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            subagent.run(request, ctx, sub_tx).await;
        });
        receivers.push((plan.database_id.as_str().to_string(), sub_rx));
    }

    let mut outputs: Vec<(String, String)> = Vec::new();

    while !receivers.is_empty() {
        // Wait for any pending subagent's next (first) event.
        let first = {
            let futures: Vec<_> = receivers
                .iter_mut()
                .map(|(_, rx)| Box::pin(rx.recv()))
                .collect();
            let (event, index, _) = select_all(futures).await;
            (event, index)
        };

        let (name, mut rx) = receivers.remove(first.1);
        let mut text = String::new();

        match first.0 {
            None => {
                // Subagent ended without emitting anything.
                outputs.push((name, text));
                continue;
            }
            Some(event) => {
                accumulate(&mut text, &event);
                if tx.send(event).await.is_err() {
                    return outputs;
                }
            }
        }

        // Drain this subagent fully so its chunks stay contiguous.
        while let Some(event) = rx.recv().await {
            accumulate(&mut text, &event);
            if tx.send(event).await.is_err() {
                return outputs;
            }
        }

        log_debug!(
            execution_id = %ctx.execution_id,
            subagent = %name,
            chars = text.len(),
            "Subagent stream drained"
        );
        outputs.push((name, text));
    }

    outputs
}

fn accumulate(text: &mut String, event: &PipelineEvent) {
    if let PipelineEvent::SubagentChunk { content, .. } = event {
        text.push_str(content);
    }
}

/// Resolve the caller's database filter to concrete ids.
fn resolve_databases(db_names: Option<&[String]>) -> Vec<DatabaseId> {
    match db_names {
        None => DatabaseId::all().to_vec(),
        Some(names) => {
            let resolved: Vec<DatabaseId> = names
                .iter()
                .filter_map(|name| {
                    let id = DatabaseId::parse(name);
                    if id.is_none() {
                        log_warn!(name = %name, "Unknown database name in filter; skipping");
                    }
                    id
                })
                .collect();
            if resolved.is_empty() {
                DatabaseId::all().to_vec()
            } else {
                resolved
            }
        }
    }
}

/// Record one stage's monitor entry, draining the LLM cost ledger.
fn record_stage(
    ctx: &ExecutionContext,
    stage: &str,
    started: Instant,
    error: Option<String>,
) {
    let totals = ctx.drain_llm_costs();
    let status = if error.is_some() { StageStatus::Failure } else { StageStatus::Success };
    let mut record = StageRecord::new(stage, status)
        .duration_ms(started.elapsed().as_millis() as u64)
        .llm_totals(totals.llm_calls, totals.total_tokens, totals.total_cost);
    if let Some(error) = error {
        record = record.error(error);
    }
    ctx.monitor.add_entry(record);
}

async fn flush_monitor(aegis: &Aegis, ctx: &ExecutionContext) {
    let posted = ctx.monitor.post_entries(aegis.monitor_sink.as_ref()).await;
    log_debug!(
        execution_id = %ctx.execution_id,
        posted = posted,
        "Pipeline telemetry flushed"
    );
}
