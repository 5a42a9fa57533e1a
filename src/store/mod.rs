//! Data stores: relational gateway, availability cache, object storage.
//!
//! Everything database-facing goes through narrow traits defined next to
//! their domain ([`domain`], [`crate::prompts::PromptStore`],
//! [`crate::transcripts::TranscriptStore`],
//! [`crate::monitor::MonitorSink`]). The [`gateway::PgGateway`] provides
//! the production implementations; tests substitute in-memory fixtures.

pub mod availability;
pub mod domain;
pub mod gateway;
pub mod object;

pub use availability::{AvailabilityCache, Institution};
pub use domain::{
    AvailabilityRow, AvailabilityStore, BenchmarkMetricRow, BenchmarkingStore, DatabaseId,
    ReportRow, ReportStore, RtsExcerpt, RtsStore,
};
pub use gateway::PgGateway;
pub use object::{ObjectStore, S3ObjectStore};
