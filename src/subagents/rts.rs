//! Regulatory-filings (RTS) subagent.
//!
//! Retrieves filing excerpts for each combination, ranks them against the
//! query intent by embedding similarity, and summarizes the best matches.

use super::{Subagent, SubagentRequest, UsageTally, DATA_UNAVAILABLE_NOTE};
use crate::context::ExecutionContext;
use crate::error::AegisResult;
use crate::llm::{ChatMessage, LlmClient, LlmParams};
use crate::monitor::{StageRecord, StageStatus};
use crate::pipeline::clarifier::BankPeriodCombination;
use crate::pipeline::events::PipelineEvent;
use crate::prompts::PromptRegistry;
use crate::settings::Settings;
use crate::store::{DatabaseId, RtsExcerpt, RtsStore};
use crate::transcripts::retrieval::cosine_similarity;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Excerpts carried into one summarization prompt.
const TOP_EXCERPTS: usize = 6;

/// Subagent over the regulatory-filings store.
pub struct RtsSubagent {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptRegistry>,
    store: Arc<dyn RtsStore>,
    settings: Arc<Settings>,
}

impl RtsSubagent {
    /// Build the subagent from shared services.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptRegistry>,
        store: Arc<dyn RtsStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { llm, prompts, store, settings }
    }

    /// Rank excerpts against the intent and keep the best.
    async fn select_excerpts(
        &self,
        intent: &str,
        excerpts: Vec<RtsExcerpt>,
        ctx: &ExecutionContext,
        tally: &mut UsageTally,
    ) -> AegisResult<Vec<RtsExcerpt>> {
        if excerpts.len() <= TOP_EXCERPTS {
            return Ok(excerpts);
        }

        let query = self.llm.embed(intent, ctx).await?;
        tally.add(None);

        let mut scored: Vec<(f32, RtsExcerpt)> = excerpts
            .into_iter()
            .map(|excerpt| {
                let score = excerpt
                    .embedding
                    .as_ref()
                    .map(|e| cosine_similarity(e, &query))
                    .unwrap_or(0.0);
                (score, excerpt)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(TOP_EXCERPTS);
        Ok(scored.into_iter().map(|(_, e)| e).collect())
    }

    async fn summarize(
        &self,
        combination: &BankPeriodCombination,
        excerpts: &[RtsExcerpt],
        ctx: &ExecutionContext,
        tally: &mut UsageTally,
    ) -> AegisResult<String> {
        let prompt = self.prompts.load_prompt("rts_subagent", "summarize", true, ctx).await?;

        let excerpt_text = excerpts
            .iter()
            .map(|e| format!("[{}]\n{}", e.section, e.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = vec![
            ChatMessage::system(prompt.system_prompt),
            ChatMessage::user(format!(
                "Bank: {} FY{} {}\nIntent: {}\n\nFiling excerpts:\n{}",
                combination.bank_name,
                combination.fiscal_year,
                combination.quarter,
                combination.query_intent,
                excerpt_text,
            )),
        ];
        let params = LlmParams::for_model(&self.settings.llm.medium.model).temperature(0.3);
        let completion = self.llm.complete(&messages, ctx, &params).await?;
        tally.add(completion.usage);

        Ok(completion.first_content().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl Subagent for RtsSubagent {
    fn database(&self) -> DatabaseId {
        DatabaseId::Rts
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
            let outcome: AegisResult<()> = async {
                let excerpts = self
                    .store
                    .fetch_excerpts(
                        combination.bank_id,
                        combination.fiscal_year,
                        combination.quarter,
                    )
                    .await?;

                if excerpts.is_empty() {
                    let note = format!(
                        "No regulatory filings are available for {} in FY{} {}.\n",
                        combination.bank_name, combination.fiscal_year, combination.quarter
                    );
                    let _ = tx
                        .send(PipelineEvent::subagent(self.database().as_str(), note))
                        .await;
                    return Ok(());
                }

                let selected = self
                    .select_excerpts(&combination.query_intent, excerpts, &ctx, &mut tally)
                    .await?;
                let summary =
                    self.summarize(combination, &selected, &ctx, &mut tally).await?;
                let _ = tx
                    .send(PipelineEvent::subagent(
                        self.database().as_str(),
                        format!("{summary}\n"),
                    ))
                    .await;
                Ok(())
            }
            .await;

            if let Err(e) = outcome {
                failure = Some(e.to_string());
                let _ = tx
                    .send(PipelineEvent::subagent(
                        self.database().as_str(),
                        format!("{DATA_UNAVAILABLE_NOTE}\n"),
                    ))
                    .await;
            }
        }

        let status =
            if failure.is_some() { StageStatus::Failure } else { StageStatus::Success };
        let mut record = StageRecord::new("subagent_rts", status)
            .duration_ms(started.elapsed().as_millis() as u64)
            .llm_totals(tally.calls, tally.tokens, tally.cost);
        if let Some(error) = failure {
            record = record.error(error);
        }
        ctx.monitor.add_entry(record);
    }
}
