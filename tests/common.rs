//! Shared fixtures for the integration suites: a scripted LLM client,
//! in-memory stores, and an `Aegis` builder wiring them together.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use aegis::etl::document::MarkdownFallbackRenderer;
use aegis::fiscal::Quarter;
use aegis::llm::connector::DeltaStream;
use aegis::llm::{ChatCompletion, ChatMessage, LlmClient, LlmParams, ToolDefinition, Usage};
use aegis::store::domain::{
    AvailabilityRow, AvailabilityStore, BenchmarkMetricRow, BenchmarkingStore, DatabaseId,
    ReportRow, ReportStore, RtsExcerpt, RtsStore,
};
use aegis::store::AvailabilityCache;
use aegis::transcripts::{RetrievalEngine, Section, TranscriptChunk, TranscriptStore};
use aegis::{
    Aegis, AegisError, AegisResult, AuthMethod, ExecutionContext, LlmCostRecord, MonitorEntry,
    MonitorSink, ObjectStore, PromptRecord, PromptRegistry, PromptStore, SslConfig,
};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ============================================================================
// Scripted LLM
// ============================================================================

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// `complete` / narration reply.
    Content(String),
    /// `complete_with_tools` reply.
    ToolCall { name: String, arguments: String },
    /// `stream` reply: the deltas to yield.
    Stream(Vec<String>),
    /// `embed` reply.
    Embedding(Vec<f32>),
}

/// LLM client that pops scripted replies in order.
///
/// An exhausted script fails the call, so a test also proves which paths
/// made no LLM calls at all.
#[derive(Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Scripted>>,
}

impl ScriptedLlm {
    pub fn new(steps: Vec<Scripted>) -> Self {
        Self { script: Mutex::new(steps.into()) }
    }

    fn pop(&self) -> AegisResult<Scripted> {
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .ok_or_else(|| AegisError::upstream("LLM script exhausted", false, None))
    }

    fn record(&self, ctx: &ExecutionContext, model: &str) {
        ctx.record_llm_cost(LlmCostRecord {
            model: model.to_string(),
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
            cost: 0.001,
        });
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<ChatCompletion> {
        self.record(ctx, &params.model);
        match self.pop()? {
            Scripted::Content(content) => Ok(completion_with_content(&content)),
            other => Err(AegisError::upstream(
                format!("Script expected Content, got {other:?}"),
                false,
                None,
            )),
        }
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<DeltaStream> {
        self.record(ctx, &params.model);
        match self.pop()? {
            Scripted::Stream(deltas) => {
                Ok(futures_util::stream::iter(deltas.into_iter().map(Ok)).boxed())
            }
            other => Err(AegisError::upstream(
                format!("Script expected Stream, got {other:?}"),
                false,
                None,
            )),
        }
    }

    async fn complete_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
        ctx: &ExecutionContext,
        params: &LlmParams,
    ) -> AegisResult<ChatCompletion> {
        self.record(ctx, &params.model);
        match self.pop()? {
            Scripted::ToolCall { name, arguments } => Ok(completion_with_tool_call(&name, &arguments)),
            other => Err(AegisError::upstream(
                format!("Script expected ToolCall, got {other:?}"),
                false,
                None,
            )),
        }
    }

    async fn embed(&self, _text: &str, ctx: &ExecutionContext) -> AegisResult<Vec<f32>> {
        self.record(ctx, "embed-model");
        match self.pop()? {
            Scripted::Embedding(vector) => Ok(vector),
            other => Err(AegisError::upstream(
                format!("Script expected Embedding, got {other:?}"),
                false,
                None,
            )),
        }
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        ctx: &ExecutionContext,
    ) -> AegisResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text, ctx).await?);
        }
        Ok(vectors)
    }
}

pub fn completion_with_content(content: &str) -> ChatCompletion {
    ChatCompletion {
        choices: vec![aegis::llm::Choice {
            message: aegis::llm::AssistantMessage {
                content: Some(content.to_string()),
                tool_calls: Vec::new(),
            },
        }],
        usage: Some(Usage { prompt_tokens: 100, completion_tokens: 50, total_tokens: 150 }),
    }
}

pub fn completion_with_tool_call(name: &str, arguments: &str) -> ChatCompletion {
    ChatCompletion {
        choices: vec![aegis::llm::Choice {
            message: aegis::llm::AssistantMessage {
                content: None,
                tool_calls: vec![aegis::llm::ToolCallPayload {
                    id: "call_1".to_string(),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
            },
        }],
        usage: Some(Usage { prompt_tokens: 100, completion_tokens: 50, total_tokens: 150 }),
    }
}

// ============================================================================
// In-memory stores
// ============================================================================

pub struct MemoryPromptStore {
    records: HashMap<(String, String), PromptRecord>,
}

impl MemoryPromptStore {
    /// A registry seeded with minimal records for every prompt the
    /// pipeline and the ETLs load.
    pub fn seeded() -> Self {
        let mut records = HashMap::new();
        let keys = [
            ("router", "route_query"),
            ("router", "direct_response"),
            ("clarifier", "clarify_query"),
            ("planner", "plan_databases"),
            ("summarizer", "synthesize_answer"),
            ("transcripts_subagent", "select_retrieval_method"),
            ("transcripts_subagent", "synthesize"),
            ("benchmarking_subagent", "narrate"),
            ("rts_subagent", "summarize"),
            ("call_summary_etl", "extraction"),
            ("key_themes_etl", "extraction"),
            ("key_themes_etl", "theme_grouping"),
            ("cm_readthrough_etl", "extraction"),
            ("wm_readthrough_etl", "extraction"),
            ("bank_earnings_etl", "extraction"),
            ("bank_earnings_etl", "overview_combination"),
        ];
        for (layer, name) in keys {
            records.insert(
                (layer.to_string(), name.to_string()),
                PromptRecord {
                    layer: layer.to_string(),
                    name: name.to_string(),
                    version: "1".to_string(),
                    description: format!("{layer}/{name} test prompt"),
                    system_prompt: format!("System prompt for {name}."),
                    user_prompt: None,
                    tool_definition: None,
                    uses_global: Vec::new(),
                },
            );
        }
        Self { records }
    }
}

#[async_trait]
impl PromptStore for MemoryPromptStore {
    async fn fetch_latest(&self, layer: &str, name: &str) -> AegisResult<Option<PromptRecord>> {
        Ok(self.records.get(&(layer.to_string(), name.to_string())).cloned())
    }
}

#[derive(Default)]
pub struct MemoryAvailability {
    pub rows: Vec<AvailabilityRow>,
}

#[async_trait]
impl AvailabilityStore for MemoryAvailability {
    async fn fetch_all(&self) -> AegisResult<Vec<AvailabilityRow>> {
        Ok(self.rows.clone())
    }
}

#[derive(Default)]
pub struct MemoryReports {
    pub rows: Mutex<Vec<ReportRow>>,
}

#[async_trait]
impl ReportStore for MemoryReports {
    async fn fetch(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        report_type: &str,
    ) -> AegisResult<Option<ReportRow>> {
        Ok(self
            .rows
            .lock()
            .expect("reports lock")
            .iter()
            .find(|r| {
                r.bank_id == bank_id
                    && r.fiscal_year == fiscal_year
                    && r.quarter == quarter
                    && r.report_type == report_type
            })
            .cloned())
    }

    async fn fetch_all_for_period(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<ReportRow>> {
        Ok(self
            .rows
            .lock()
            .expect("reports lock")
            .iter()
            .filter(|r| {
                r.bank_id == bank_id && r.fiscal_year == fiscal_year && r.quarter == quarter
            })
            .cloned()
            .collect())
    }

    async fn replace(&self, row: &ReportRow) -> AegisResult<()> {
        let mut rows = self.rows.lock().expect("reports lock");
        rows.retain(|r| {
            !(r.bank_id == row.bank_id
                && r.fiscal_year == row.fiscal_year
                && r.quarter == row.quarter
                && r.report_type == row.report_type)
        });
        rows.push(row.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBenchmarking {
    pub rows: Vec<BenchmarkMetricRow>,
}

#[async_trait]
impl BenchmarkingStore for MemoryBenchmarking {
    async fn fetch_metrics(
        &self,
        _bank_id: i32,
        _fiscal_year: i32,
        _quarter: Quarter,
        platform: Option<&str>,
    ) -> AegisResult<Vec<BenchmarkMetricRow>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| platform.map_or(true, |p| r.platform == p))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryRts {
    pub excerpts: Vec<RtsExcerpt>,
}

#[async_trait]
impl RtsStore for MemoryRts {
    async fn fetch_excerpts(
        &self,
        _bank_id: i32,
        _fiscal_year: i32,
        _quarter: Quarter,
    ) -> AegisResult<Vec<RtsExcerpt>> {
        Ok(self.excerpts.clone())
    }
}

#[derive(Default)]
pub struct MemoryTranscripts {
    pub chunks: Vec<TranscriptChunk>,
}

#[async_trait]
impl TranscriptStore for MemoryTranscripts {
    async fn fetch_section(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        section: Section,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.bank_id == bank_id
                    && c.fiscal_year == fiscal_year
                    && c.quarter == quarter.to_string()
                    && c.section == section
            })
            .cloned()
            .collect())
    }

    async fn fetch_call(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.bank_id == bank_id
                    && c.fiscal_year == fiscal_year
                    && c.quarter == quarter.to_string()
            })
            .cloned()
            .collect())
    }

    async fn fetch_speaker_block(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        speaker_block_id: i64,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.bank_id == bank_id
                    && c.fiscal_year == fiscal_year
                    && c.quarter == quarter.to_string()
                    && c.speaker_block_id == speaker_block_id
            })
            .cloned()
            .collect())
    }

    async fn fetch_qa_group(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        qa_group_id: i64,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                c.bank_id == bank_id
                    && c.fiscal_year == fiscal_year
                    && c.quarter == quarter.to_string()
                    && c.qa_group_id == Some(qa_group_id)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub entries: Mutex<Vec<MonitorEntry>>,
}

#[async_trait]
impl MonitorSink for CollectingSink {
    async fn post(&self, entries: &[MonitorEntry]) -> AegisResult<()> {
        self.entries.lock().expect("sink lock").extend(entries.iter().cloned());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    pub uploads: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> AegisResult<String> {
        self.uploads.lock().expect("uploads lock").push((name.to_string(), bytes.len()));
        Ok(format!("s3://test-bucket/{name}"))
    }
}

// ============================================================================
// Fixture assembly
// ============================================================================

/// Everything a test needs to drive and then inspect a run.
pub struct Fixture {
    pub aegis: Aegis,
    pub sink: Arc<CollectingSink>,
    pub reports: Arc<MemoryReports>,
    pub uploads: Arc<MemoryObjectStore>,
}

pub struct FixtureBuilder {
    pub availability: MemoryAvailability,
    pub transcripts: MemoryTranscripts,
    pub reports: MemoryReports,
    pub benchmarking: MemoryBenchmarking,
    pub rts: MemoryRts,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self {
            availability: MemoryAvailability::default(),
            transcripts: MemoryTranscripts::default(),
            reports: MemoryReports::default(),
            benchmarking: MemoryBenchmarking::default(),
            rts: MemoryRts::default(),
        }
    }
}

impl FixtureBuilder {
    pub fn availability_row(
        mut self,
        bank_id: i32,
        name: &str,
        symbol: &str,
        fiscal_year: i32,
        quarter: Quarter,
        databases: &[DatabaseId],
    ) -> Self {
        self.availability.rows.push(AvailabilityRow {
            bank_id,
            bank_name: name.to_string(),
            bank_symbol: symbol.to_string(),
            fiscal_year,
            quarter,
            database_names: databases.to_vec(),
        });
        self
    }

    pub fn transcript_chunk(mut self, chunk: TranscriptChunk) -> Self {
        self.transcripts.chunks.push(chunk);
        self
    }

    pub fn report_row(mut self, row: ReportRow) -> Self {
        self.reports.rows.lock().expect("reports lock").push(row);
        self
    }

    pub fn benchmark_metric(mut self, platform: &str, metric: &str, value: &str) -> Self {
        self.benchmarking.rows.push(BenchmarkMetricRow {
            metric_name: metric.to_string(),
            platform: platform.to_string(),
            value: value.to_string(),
            change: None,
        });
        self
    }

    pub fn build(self, llm: Arc<dyn LlmClient>) -> Fixture {
        let settings = Arc::new(test_settings());
        let sink = Arc::new(CollectingSink::default());
        let reports = Arc::new(self.reports);
        let uploads = Arc::new(MemoryObjectStore::default());
        let transcripts = Arc::new(self.transcripts);

        let aegis = Aegis {
            settings: Arc::clone(&settings),
            ssl: SslConfig::insecure(),
            llm,
            prompts: Arc::new(PromptRegistry::new(Arc::new(MemoryPromptStore::seeded()))),
            availability: Arc::new(AvailabilityCache::new(Arc::new(self.availability))),
            retrieval: Arc::new(RetrievalEngine::new(
                Arc::clone(&transcripts) as Arc<dyn TranscriptStore>
            )),
            transcripts,
            benchmarking: Arc::new(self.benchmarking),
            reports: Arc::clone(&reports) as Arc<dyn ReportStore>,
            rts: Arc::new(self.rts),
            monitor_sink: Arc::clone(&sink) as Arc<dyn MonitorSink>,
            object_store: Arc::clone(&uploads) as Arc<dyn ObjectStore>,
            renderer: Arc::new(MarkdownFallbackRenderer),
        };

        Fixture { aegis, sink, reports, uploads }
    }
}

pub fn test_settings() -> aegis::Settings {
    use aegis::settings::{LlmSettings, ModelTier, PostgresSettings};
    aegis::Settings {
        auth_method: AuthMethod::ApiKey,
        api_key: Some("test-key".to_string()),
        oauth_endpoint: None,
        oauth_client_id: None,
        oauth_client_secret: None,
        oauth_max_retries: 3,
        oauth_retry_delay: 0.01,
        ssl_verify: false,
        ssl_cert_path: None,
        log_level: "debug".to_string(),
        llm: LlmSettings {
            base_url: "http://localhost:9".to_string(),
            small: ModelTier {
                model: "small-model".to_string(),
                cost_per_1k_input: 0.001,
                cost_per_1k_output: 0.002,
            },
            medium: ModelTier {
                model: "medium-model".to_string(),
                cost_per_1k_input: 0.005,
                cost_per_1k_output: 0.01,
            },
            large: ModelTier {
                model: "large-model".to_string(),
                cost_per_1k_input: 0.01,
                cost_per_1k_output: 0.03,
            },
            embedding_model: "embed-model".to_string(),
        },
        postgres: PostgresSettings {
            host: "localhost".to_string(),
            port: 5432,
            user: "aegis".to_string(),
            password: String::new(),
            database: "aegis".to_string(),
        },
        s3_bucket: "test-bucket".to_string(),
        max_history_length: 10,
        allowed_roles: vec!["user".to_string(), "assistant".to_string()],
        include_system_messages: false,
    }
}

/// A pre-rendered report row fixture.
pub fn seeded_report_row(
    bank_id: i32,
    symbol: &str,
    name: &str,
    fiscal_year: i32,
    quarter: Quarter,
) -> ReportRow {
    ReportRow {
        bank_id,
        bank_name: name.to_string(),
        bank_symbol: symbol.to_string(),
        fiscal_year,
        quarter,
        report_type: "call_summary".to_string(),
        local_filepath: String::new(),
        s3_document_name: format!(
            "reports/{}_{}_{}_abcd1234.docx",
            symbol.split('-').next().unwrap_or(symbol),
            fiscal_year,
            quarter
        ),
        s3_pdf_name: None,
        markdown_content: Some("# Call Summary\n\nManagement noted solid results.".to_string()),
        report_name: "Earnings Call Summary".to_string(),
        report_description: "Structured summary".to_string(),
        generated_at: Utc::now(),
        execution_id: Uuid::new_v4(),
    }
}
