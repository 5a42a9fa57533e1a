//! # aegis
//!
//! Financial-research assistant over bank earnings data: an interactive
//! agent pipeline and a family of batch report ETLs sharing one
//! orchestration fabric.
//!
//! ## Key Features
//!
//! - **Agent pipeline**: router, clarifier, planner, per-database
//!   subagents, and summarizer over a single streaming event schema
//! - **Report ETLs**: call summary, key themes, capital-markets and
//!   wealth-management readthroughs, and the bank earnings report
//! - **Shared services**: fiscal clock, versioned prompt registry, LLM
//!   connector (complete / stream / tool-call / embed), transcript
//!   retrieval engine, process-monitor telemetry
//! - **Resilience**: bounded retries with circuit breaking, per-request
//!   auth, swallowed-telemetry guarantees
//!
//! ## Example
//!
//! ```rust,no_run
//! use aegis::{Aegis, ConversationInput};
//! use tokio_stream::StreamExt;
//!
//! # async fn example(aegis: Aegis) -> anyhow::Result<()> {
//! let input: ConversationInput = serde_json::from_str(
//!     r#"[{"role": "user", "content": "Show me RBC Q2 2025 call summary"}]"#,
//! )?;
//!
//! let mut events = aegis.model(input, Some(vec!["reports".to_string()]));
//! while let Some(event) = events.next().await {
//!     println!("[{}/{}] {}", event.kind_label(), event.name(), event.content());
//! }
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

// =============================================================================
// Module declarations
// =============================================================================

pub mod assistant;
pub mod auth;
pub mod context;
pub mod conversation;
pub mod error;
pub mod etl;
pub mod fiscal;
pub mod llm;
pub mod monitor;
pub mod pipeline;
pub mod prompts;
pub mod settings;
pub mod ssl;
pub mod store;
pub mod subagents;
pub mod transcripts;

// Internal modules
pub(crate) mod logging;

#[cfg(test)]
pub mod tests;

// =============================================================================
// Public API re-exports
// =============================================================================

// Facade and entry points
pub use assistant::Aegis;
pub use etl::{
    generate_bank_earnings_report, generate_call_summary, generate_cm_readthrough,
    generate_key_themes, generate_wm_readthrough, EtlOutcome,
};

// Errors
pub use error::{AegisError, AegisResult, ErrorCategory, ErrorSeverity};

// Configuration and bootstrap
pub use auth::{setup_authentication, AuthConfig};
pub use settings::{AuthMethod, Settings};
pub use ssl::{setup_ssl, SslConfig};

// Execution plumbing
pub use context::{ExecutionContext, LlmCostRecord};
pub use monitor::{Monitor, MonitorEntry, MonitorSink, StageRecord, StageStatus};

// Conversation and events
pub use conversation::{process_conversation, Conversation, ConversationInput};
pub use pipeline::{BankPeriodCombination, DatabasePlan, PipelineEvent, AGENT_NAME};

// Fiscal clock
pub use fiscal::{current_period, fiscal_statement, quarter_dates, Quarter};

// LLM connector
pub use llm::{ChatMessage, LlmClient, LlmParams, OpenAiCompatibleConnector, ToolDefinition};

// Prompts
pub use prompts::{LoadedPrompt, PromptRecord, PromptRegistry, PromptStore};

// Stores
pub use store::{
    AvailabilityCache, DatabaseId, Institution, ObjectStore, PgGateway, ReportRow, ReportStore,
};

// Transcripts
pub use transcripts::{
    RetrievalEngine, RetrievalMethod, Section, TranscriptChunk, TranscriptStore, GAP_SENTINEL,
};

// Subagents
pub use subagents::{Subagent, NO_REPORT_CONTENT};
