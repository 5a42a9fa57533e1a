//! Benchmarking subagent.
//!
//! Runs a structured query over the benchmarking table for each
//! combination and narrates the metrics. When the narration LLM call
//! fails, the subagent degrades to a deterministic formatting of the
//! table rather than dropping the data.

use super::{Subagent, SubagentRequest, UsageTally, DATA_UNAVAILABLE_NOTE};
use crate::context::ExecutionContext;
use crate::llm::{ChatMessage, LlmClient, LlmParams};
use crate::logging::log_warn;
use crate::monitor::{StageRecord, StageStatus};
use crate::pipeline::clarifier::BankPeriodCombination;
use crate::pipeline::events::PipelineEvent;
use crate::prompts::PromptRegistry;
use crate::settings::Settings;
use crate::store::{BenchmarkMetricRow, BenchmarkingStore, DatabaseId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Subagent over the benchmarking metrics table.
pub struct BenchmarkingSubagent {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptRegistry>,
    store: Arc<dyn BenchmarkingStore>,
    settings: Arc<Settings>,
}

impl BenchmarkingSubagent {
    /// Build the subagent from shared services.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptRegistry>,
        store: Arc<dyn BenchmarkingStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { llm, prompts, store, settings }
    }

    /// Deterministic fallback formatting, grouped by platform.
    fn format_table(combination: &BankPeriodCombination, rows: &[BenchmarkMetricRow]) -> String {
        let mut lines = vec![format!(
            "Benchmarking metrics for {} in FY{} {}:",
            combination.bank_name, combination.fiscal_year, combination.quarter
        )];
        let mut current_platform: Option<&str> = None;
        for row in rows {
            if current_platform != Some(row.platform.as_str()) {
                lines.push(format!("\n{}:", row.platform));
                current_platform = Some(row.platform.as_str());
            }
            let change = row
                .change
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default();
            lines.push(format!("- {}: {}{}", row.metric_name, row.value, change));
        }
        lines.join("\n")
    }

    async fn narrate(
        &self,
        combination: &BankPeriodCombination,
        rows: &[BenchmarkMetricRow],
        ctx: &ExecutionContext,
        tally: &mut UsageTally,
    ) -> String {
        let table = Self::format_table(combination, rows);

        let narrated: crate::error::AegisResult<Option<String>> = async {
            let prompt =
                self.prompts.load_prompt("benchmarking_subagent", "narrate", true, ctx).await?;
            let messages = vec![
                ChatMessage::system(prompt.system_prompt),
                ChatMessage::user(format!(
                    "Intent: {}\n\n{}",
                    combination.query_intent, table
                )),
            ];
            let params =
                LlmParams::for_model(&self.settings.llm.medium.model).temperature(0.3);
            let completion = self.llm.complete(&messages, ctx, &params).await?;
            tally.add(completion.usage);
            Ok(completion.first_content().map(str::to_string))
        }
        .await;

        match narrated {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            _ => {
                log_warn!(
                    execution_id = %ctx.execution_id,
                    bank_id = combination.bank_id,
                    "Benchmarking narration unavailable; using table formatting"
                );
                table
            }
        }
    }
}

#[async_trait]
impl Subagent for BenchmarkingSubagent {
    fn database(&self) -> DatabaseId {
        DatabaseId::Benchmarking
    }

    async fn run(
        &self,
        request: SubagentRequest,
        ctx: Arc<ExecutionContext>,
        tx: mpsc::Sender<PipelineEvent>,
    ) {
        let started = Instant::now();
        let mut tally = UsageTally::default();
        let mut failure: Option<String> = None;

        let _ = tx.send(PipelineEvent::subagent_start(self.database().as_str())).await;

        for combination in &request.combinations {
            match self
                .store
                .fetch_metrics(
                    combination.bank_id,
                    combination.fiscal_year,
                    combination.quarter,
                    None,
                )
                .await
            {
                Ok(rows) if rows.is_empty() => {
                    let note = format!(
                        "No benchmarking metrics are available for {} in FY{} {}.\n",
                        combination.bank_name, combination.fiscal_year, combination.quarter
                    );
                    let _ = tx
                        .send(PipelineEvent::subagent(self.database().as_str(), note))
                        .await;
                }
                Ok(rows) => {
                    let text = self.narrate(combination, &rows, &ctx, &mut tally).await;
                    let _ = tx
                        .send(PipelineEvent::subagent(
                            self.database().as_str(),
                            format!("{text}\n"),
                        ))
                        .await;
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    let _ = tx
                        .send(PipelineEvent::subagent(
                            self.database().as_str(),
                            format!("{DATA_UNAVAILABLE_NOTE}\n"),
                        ))
                        .await;
                }
            }
        }

        let status =
            if failure.is_some() { StageStatus::Failure } else { StageStatus::Success };
        let mut record = StageRecord::new("subagent_benchmarking", status)
            .duration_ms(started.elapsed().as_millis() as u64)
            .llm_totals(tally.calls, tally.tokens, tally.cost);
        if let Some(error) = failure {
            record = record.error(error);
        }
        ctx.monitor.add_entry(record);
    }
}
