//! Per-database subagents.
//!
//! Each subagent answers one database's slice of a research request and
//! streams synthesized prose as `{type=subagent, name=<database_id>}`
//! events. All subagents observe the same output rules: no internal
//! identifiers (qa_group_id, speaker_block_id, chunk_id), no raw section
//! headers, attribution phrases for transcript material, and verbatim
//! quotes only inside quotation marks. Each run records a monitor entry
//! with its LLM call, token, and cost totals.

pub mod benchmarking;
pub mod reports;
pub mod rts;
pub mod transcripts;

use crate::context::ExecutionContext;
use crate::llm::Usage;
use crate::pipeline::clarifier::BankPeriodCombination;
use crate::pipeline::events::PipelineEvent;
use crate::store::DatabaseId;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use benchmarking::BenchmarkingSubagent;
pub use reports::{ReportsSubagent, NO_REPORT_CONTENT};
pub use rts::RtsSubagent;
pub use transcripts::TranscriptsSubagent;

/// Inputs to one subagent run.
#[derive(Debug, Clone)]
pub struct SubagentRequest {
    /// The latest user message.
    pub latest_message: String,
    /// Resolved bank-period combinations.
    pub combinations: Vec<BankPeriodCombination>,
    /// One-line intent from the planner.
    pub basic_intent: String,
    /// Full intent paragraph from the planner.
    pub full_intent: String,
}

/// One database's subagent.
///
/// `run` never returns an error: upstream failures degrade to a
/// "data temporarily unavailable" note in the stream, and the failure is
/// recorded in the monitor.
#[async_trait]
pub trait Subagent: Send + Sync {
    /// The database this subagent serves.
    fn database(&self) -> DatabaseId;

    /// Produce this subagent's event stream for the request.
    async fn run(
        &self,
        request: SubagentRequest,
        ctx: Arc<ExecutionContext>,
        tx: mpsc::Sender<PipelineEvent>,
    );
}

/// Note streamed when a subagent's upstream is unavailable.
pub const DATA_UNAVAILABLE_NOTE: &str =
    "Data is temporarily unavailable for this source. Please try again shortly.";

/// Running LLM usage totals for one subagent's monitor entry.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct UsageTally {
    pub calls: u32,
    pub tokens: u64,
    pub cost: f64,
}

impl UsageTally {
    pub(crate) fn add(&mut self, usage: Option<Usage>) {
        self.calls += 1;
        if let Some(usage) = usage {
            self.tokens += usage.total_tokens;
        }
    }
}

/// Strip internal identifiers from retrieved text before it reaches a
/// synthesis prompt. The corpus itself is prose, so these tokens only
/// appear if upstream tooling leaked them into chunk text.
pub(crate) fn scrub_internal_identifiers(text: &str) -> String {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        regex::Regex::new(r"(?i)\b(?:qa_group_id|speaker_block_id|chunk_id)\s*[:=]?\s*\d*\b")
            .expect("identifier regex is valid")
    });
    pattern.replace_all(text, "").into_owned()
}
