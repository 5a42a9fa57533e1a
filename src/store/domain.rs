//! Domain rows and store traits shared by the pipeline and the ETLs.

use crate::error::AegisResult;
use crate::fiscal::Quarter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one queryable database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseId {
    /// Earnings-call transcript corpus.
    Transcripts,
    /// Benchmarking metrics.
    Benchmarking,
    /// Pre-built report registry.
    Reports,
    /// Regulatory filings (report to shareholders).
    Rts,
    /// Pillar 3 regulatory disclosures.
    Pillar3,
}

impl DatabaseId {
    /// Wire form of the id.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseId::Transcripts => "transcripts",
            DatabaseId::Benchmarking => "benchmarking",
            DatabaseId::Reports => "reports",
            DatabaseId::Rts => "rts",
            DatabaseId::Pillar3 => "pillar3",
        }
    }

    /// Parse the wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transcripts" => Some(DatabaseId::Transcripts),
            "benchmarking" => Some(DatabaseId::Benchmarking),
            "reports" => Some(DatabaseId::Reports),
            "rts" => Some(DatabaseId::Rts),
            "pillar3" => Some(DatabaseId::Pillar3),
            _ => None,
        }
    }

    /// All databases the pipeline can dispatch to.
    pub fn all() -> [DatabaseId; 5] {
        [
            DatabaseId::Transcripts,
            DatabaseId::Benchmarking,
            DatabaseId::Reports,
            DatabaseId::Rts,
            DatabaseId::Pillar3,
        ]
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the authoritative data-availability table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRow {
    /// Institution id.
    pub bank_id: i32,
    /// Display name.
    pub bank_name: String,
    /// Ticker symbol (e.g. `RY-CA`).
    pub bank_symbol: String,
    /// Fiscal year.
    pub fiscal_year: i32,
    /// Fiscal quarter.
    pub quarter: Quarter,
    /// Databases with data for this (bank, period). Never empty for a
    /// stored row.
    pub database_names: Vec<DatabaseId>,
}

/// Read access to the data-availability table.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Every availability row.
    async fn fetch_all(&self) -> AegisResult<Vec<AvailabilityRow>>;
}

/// One persisted report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Institution id.
    pub bank_id: i32,
    /// Display name.
    pub bank_name: String,
    /// Ticker symbol.
    pub bank_symbol: String,
    /// Fiscal year.
    pub fiscal_year: i32,
    /// Fiscal quarter.
    pub quarter: Quarter,
    /// Report type (e.g. `call_summary`).
    pub report_type: String,
    /// Path the rendered document was written to locally.
    pub local_filepath: String,
    /// Object-store document name.
    pub s3_document_name: String,
    /// Object-store PDF name, when one was rendered.
    pub s3_pdf_name: Option<String>,
    /// Rendered markdown payload.
    pub markdown_content: Option<String>,
    /// Display name of the report.
    pub report_name: String,
    /// Display description.
    pub report_description: String,
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
    /// Execution that generated the row.
    pub execution_id: Uuid,
}

/// Access to the reports table.
///
/// The table is unique on (bank, fiscal_year, quarter, report_type); a new
/// generation replaces the existing row.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Look up the current row for one (bank, period, type).
    async fn fetch(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        report_type: &str,
    ) -> AegisResult<Option<ReportRow>>;

    /// Every report row for one (bank, period), across report types.
    async fn fetch_all_for_period(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<ReportRow>>;

    /// DELETE any existing row for the key, then INSERT `row`, in one
    /// transaction. On failure the error message carries a `stage` field
    /// naming which half failed.
    async fn replace(&self, row: &ReportRow) -> AegisResult<()>;
}

/// One benchmarking metric observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetricRow {
    /// Metric name (e.g. `NIM`, `CET1 ratio`).
    pub metric_name: String,
    /// Reporting platform or segment.
    pub platform: String,
    /// Metric value, formatted for display.
    pub value: String,
    /// Period-over-period delta, when reported.
    pub change: Option<String>,
}

/// Structured query access to the benchmarking table.
#[async_trait]
pub trait BenchmarkingStore: Send + Sync {
    /// Metrics for one (bank, period), optionally filtered by platform.
    async fn fetch_metrics(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        platform: Option<&str>,
    ) -> AegisResult<Vec<BenchmarkMetricRow>>;
}

/// One regulatory-filing excerpt with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtsExcerpt {
    /// Source document section.
    pub section: String,
    /// Excerpt text.
    pub text: String,
    /// Dense embedding, when one has been computed.
    pub embedding: Option<Vec<f32>>,
}

/// Access to the regulatory-filings store.
#[async_trait]
pub trait RtsStore: Send + Sync {
    /// Excerpts for one (bank, period).
    async fn fetch_excerpts(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<RtsExcerpt>>;
}
