//! The Aegis facade: shared services plus the interactive entry point.
//!
//! [`Aegis`] wires the connector, prompt registry, availability cache,
//! retrieval engine, and domain stores together. [`Aegis::model`] is the
//! interactive entry point: it returns a lazy stream of
//! [`PipelineEvent`]s, ending normally after the summarizer or with a
//! single final `agent` event carrying a user-facing error.
//!
//! # Example
//!
//! ```rust,no_run
//! use aegis::{Aegis, ConversationInput};
//! use tokio_stream::StreamExt;
//!
//! # async fn example(aegis: Aegis) -> anyhow::Result<()> {
//! let input: ConversationInput = serde_json::from_str(
//!     r#"{"messages": [{"role": "user", "content": "How did RBC do in Q2 2025?"}]}"#,
//! )?;
//!
//! let mut events = aegis.model(input, None);
//! while let Some(event) = events.next().await {
//!     print!("{}", event.content());
//! }
//! # Ok(())
//! # }
//! ```

use crate::conversation::ConversationInput;
use crate::etl::document::DocumentRenderer;
use crate::llm::LlmClient;
use crate::monitor::MonitorSink;
use crate::pipeline::{self, PipelineEvent};
use crate::prompts::PromptRegistry;
use crate::settings::Settings;
use crate::ssl::SslConfig;
use crate::store::{
    AvailabilityCache, BenchmarkingStore, DatabaseId, ObjectStore, ReportStore, RtsStore,
};
use crate::subagents::{
    BenchmarkingSubagent, ReportsSubagent, RtsSubagent, Subagent, TranscriptsSubagent,
};
use crate::transcripts::{RetrievalEngine, TranscriptStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Shared services for the pipeline and the ETLs.
#[derive(Clone)]
pub struct Aegis {
    /// Frozen process configuration.
    pub settings: Arc<Settings>,
    /// Resolved TLS trust, shared by every per-request context.
    pub ssl: SslConfig,
    /// LLM connector.
    pub llm: Arc<dyn LlmClient>,
    /// Versioned prompt registry.
    pub prompts: Arc<PromptRegistry>,
    /// Data-availability cache.
    pub availability: Arc<AvailabilityCache>,
    /// Transcript retrieval engine.
    pub retrieval: Arc<RetrievalEngine>,
    /// Transcript corpus (used directly by the ETLs).
    pub transcripts: Arc<dyn TranscriptStore>,
    /// Benchmarking metrics.
    pub benchmarking: Arc<dyn BenchmarkingStore>,
    /// Pre-built report registry.
    pub reports: Arc<dyn ReportStore>,
    /// Regulatory filings.
    pub rts: Arc<dyn RtsStore>,
    /// Telemetry destination.
    pub monitor_sink: Arc<dyn MonitorSink>,
    /// Object storage for rendered documents.
    pub object_store: Arc<dyn ObjectStore>,
    /// Renderer for binary document formats (external collaborator).
    pub renderer: Arc<dyn DocumentRenderer>,
}

impl Aegis {
    /// Interactive entry point: stream pipeline events for one turn.
    ///
    /// `db_names` optionally restricts the databases the research path may
    /// query; unknown names are skipped, and an empty surviving filter
    /// falls back to all databases.
    ///
    /// The stream is lazy and finite. Dropping it cancels the pipeline at
    /// its next suspension point.
    pub fn model(
        &self,
        input: ConversationInput,
        db_names: Option<Vec<String>>,
    ) -> ReceiverStream<PipelineEvent> {
        let (tx, rx) = mpsc::channel(pipeline::EVENT_CHANNEL_DEPTH);
        let aegis = self.clone();
        tokio::spawn(async move {
            pipeline::run(aegis, input, db_names, tx).await;
        });
        ReceiverStream::new(rx)
    }

    /// The subagent serving one database, if one is registered.
    ///
    /// Pillar 3 data is reachable only through the bank-earnings ETL; it
    /// has no interactive subagent.
    pub fn subagent_for(&self, database: DatabaseId) -> Option<Arc<dyn Subagent>> {
        match database {
            DatabaseId::Transcripts => Some(Arc::new(TranscriptsSubagent::new(
                Arc::clone(&self.llm),
                Arc::clone(&self.prompts),
                Arc::clone(&self.retrieval),
                Arc::clone(&self.settings),
            ))),
            DatabaseId::Benchmarking => Some(Arc::new(BenchmarkingSubagent::new(
                Arc::clone(&self.llm),
                Arc::clone(&self.prompts),
                Arc::clone(&self.benchmarking),
                Arc::clone(&self.settings),
            ))),
            DatabaseId::Reports => {
                Some(Arc::new(ReportsSubagent::new(Arc::clone(&self.reports))))
            }
            DatabaseId::Rts => Some(Arc::new(RtsSubagent::new(
                Arc::clone(&self.llm),
                Arc::clone(&self.prompts),
                Arc::clone(&self.rts),
                Arc::clone(&self.settings),
            ))),
            DatabaseId::Pillar3 => None,
        }
    }
}
