//! Transcripts subagent.
//!
//! For each combination, an LLM tool call picks one of the six retrieval
//! methods; the retrieval engine executes it; and a synthesis call turns
//! the retrieved text into prose that paraphrases and quotes the call.
//! The synthesis prompt enforces the attribution rules ("management
//! noted", "analysts asked", "the CFO responded"), and retrieved text is
//! scrubbed of internal identifiers before it reaches the prompt.

use super::{
    scrub_internal_identifiers, Subagent, SubagentRequest, UsageTally, DATA_UNAVAILABLE_NOTE,
};
use crate::context::ExecutionContext;
use crate::error::AegisResult;
use crate::llm::{parse_tool_arguments, ChatMessage, LlmClient, LlmParams, ToolDefinition};
use crate::logging::{log_debug, log_warn};
use crate::monitor::{StageRecord, StageStatus};
use crate::pipeline::clarifier::BankPeriodCombination;
use crate::pipeline::events::PipelineEvent;
use crate::prompts::{render_template, PromptRegistry};
use crate::settings::Settings;
use crate::store::DatabaseId;
use crate::transcripts::{RetrievalEngine, RetrievalMethod, RetrievedContent};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Subagent over the earnings-call transcript corpus.
pub struct TranscriptsSubagent {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptRegistry>,
    engine: Arc<RetrievalEngine>,
    settings: Arc<Settings>,
}

impl TranscriptsSubagent {
    /// Build the subagent from shared services.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptRegistry>,
        engine: Arc<RetrievalEngine>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { llm, prompts, engine, settings }
    }

    /// Pick a retrieval method for one combination via LLM tool call.
    async fn select_method(
        &self,
        combination: &BankPeriodCombination,
        request: &SubagentRequest,
        ctx: &ExecutionContext,
        tally: &mut UsageTally,
    ) -> AegisResult<RetrievalMethod> {
        let prompt = self
            .prompts
            .load_prompt("transcripts_subagent", "select_retrieval_method", true, ctx)
            .await?;

        let user_text = format!(
            "Bank: {} ({}), FY{} {}\nIntent for this bank: {}\nOverall request: {}",
            combination.bank_name,
            combination.bank_symbol,
            combination.fiscal_year,
            combination.quarter,
            combination.query_intent,
            request.full_intent,
        );
        let messages =
            vec![ChatMessage::system(prompt.system_prompt), ChatMessage::user(user_text)];

        let tool = ToolDefinition {
            name: "select_retrieval_method".to_string(),
            description: "Choose how to retrieve transcript content for this intent".to_string(),
            parameters: prompt.tool_definition.unwrap_or_else(default_method_schema),
        };

        let params = LlmParams::for_model(&self.settings.llm.small.model).temperature(0.0);
        let completion = self.llm.complete_with_tools(&messages, &[tool], ctx, &params).await?;
        tally.add(completion.usage);

        let Some(call) = completion.first_tool_call() else {
            log_warn!(
                execution_id = %ctx.execution_id,
                "Method selection returned no tool call; using full QA section"
            );
            return Ok(RetrievalMethod::FullSection { section: crate::transcripts::Section::QA });
        };

        parse_tool_arguments(&call.arguments)
    }

    async fn retrieve_for(
        &self,
        combination: &BankPeriodCombination,
        method: &RetrievalMethod,
        ctx: &ExecutionContext,
        tally: &mut UsageTally,
    ) -> AegisResult<RetrievedContent> {
        let query_embedding = if method.needs_embedding() {
            let embedding = self.llm.embed(&combination.query_intent, ctx).await?;
            tally.add(None);
            Some(embedding)
        } else {
            None
        };

        self.engine
            .retrieve(
                combination.bank_id,
                combination.fiscal_year,
                combination.quarter,
                method,
                query_embedding.as_deref(),
            )
            .await
    }

    /// Stream the synthesis for one combination.
    async fn synthesize(
        &self,
        combination: &BankPeriodCombination,
        content: &RetrievedContent,
        ctx: &ExecutionContext,
        tally: &mut UsageTally,
        tx: &mpsc::Sender<PipelineEvent>,
    ) -> AegisResult<()> {
        let prompt =
            self.prompts.load_prompt("transcripts_subagent", "synthesize", true, ctx).await?;

        let transcript_content = scrub_internal_identifiers(&content.rendered());
        let user_template = prompt.user_prompt.unwrap_or_else(|| {
            "Intent: {query_intent}\n\nTranscript content:\n{transcript_content}".to_string()
        });
        let user_text = render_template(
            &user_template,
            &[
                ("bank_name", combination.bank_name.as_str()),
                ("fiscal_year", &combination.fiscal_year.to_string()),
                ("quarter", &combination.quarter.to_string()),
                ("query_intent", combination.query_intent.as_str()),
                ("transcript_content", transcript_content.as_str()),
            ],
        );

        let messages =
            vec![ChatMessage::system(prompt.system_prompt), ChatMessage::user(user_text)];
        let params = LlmParams::for_model(&self.settings.llm.medium.model).temperature(0.3);

        let mut stream = self.llm.stream(&messages, ctx, &params).await?;
        tally.add(None);
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            if tx
                .send(PipelineEvent::subagent(self.database().as_str(), delta))
                .await
                .is_err()
            {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Subagent for TranscriptsSubagent {
    fn database(&self) -> DatabaseId {
        DatabaseId::Transcripts
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
                let method =
                    self.select_method(combination, &request, &ctx, &mut tally).await?;
                log_debug!(
                    execution_id = %ctx.execution_id,
                    bank_id = combination.bank_id,
                    method = ?method,
                    "Retrieval method selected"
                );

                let content =
                    self.retrieve_for(combination, &method, &ctx, &mut tally).await?;
                if content.is_empty() {
                    let note = format!(
                        "No transcript content is available for {} in FY{} {}.\n",
                        combination.bank_name, combination.fiscal_year, combination.quarter
                    );
                    let _ = tx
                        .send(PipelineEvent::subagent(self.database().as_str(), note))
                        .await;
                    return Ok(());
                }

                self.synthesize(combination, &content, &ctx, &mut tally, &tx).await
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
        let mut record = StageRecord::new("subagent_transcripts", status)
            .duration_ms(started.elapsed().as_millis() as u64)
            .llm_totals(tally.calls, tally.tokens, tally.cost);
        if let Some(error) = failure {
            record = record.error(error);
        }
        ctx.monitor.add_entry(record);
    }
}

fn default_method_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "method": {
                "type": "string",
                "enum": [
                    "full_section", "category_similarity", "speaker_block",
                    "qa_group", "chunk_neighborhood", "vector_topk"
                ]
            },
            "section": {"type": "string", "enum": ["MD", "QA"]},
            "category": {"type": "string"},
            "top_k": {"type": "integer"},
            "speaker_block_id": {"type": "integer"},
            "qa_group_id": {"type": "integer"},
            "chunk_id": {"type": "integer"},
            "window": {"type": "integer"}
        },
        "required": ["method"]
    })
}
