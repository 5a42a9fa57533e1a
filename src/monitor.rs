//! Per-execution, per-stage telemetry.
//!
//! Every request and ETL run owns a [`Monitor`] scoped to its execution id.
//! Stages append [`MonitorEntry`] records in insertion order;
//! [`Monitor::post_entries`] flushes them through a [`MonitorSink`] and
//! returns the count. Sink failures are swallowed and logged; telemetry
//! never raises into the caller.
//!
//! The monitor is not a global: it lives on the execution context and is
//! dropped with it.

use crate::error::AegisResult;
use crate::logging::{log_debug, log_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// Maximum serialized size of a metadata blob, in bytes.
///
/// Larger blobs are truncated and flagged rather than rejected.
pub const METADATA_BLOB_LIMIT: usize = 4096;

/// Outcome of a pipeline or ETL stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// Stage completed.
    Success,
    /// Stage failed; `error` carries the description.
    Failure,
}

impl StageStatus {
    /// Wire form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "Success",
            StageStatus::Failure => "Failure",
        }
    }
}

/// Append-only per-stage telemetry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEntry {
    /// Execution this entry belongs to.
    pub execution_id: Uuid,
    /// Model name the execution was initialized with (e.g. `aegis`).
    pub model_name: String,
    /// Stage that produced the entry.
    pub stage_name: String,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// Stage duration in milliseconds.
    pub duration_ms: u64,
    /// Stage outcome.
    pub status: StageStatus,
    /// Number of LLM calls the stage made.
    pub llm_calls: u32,
    /// Total tokens across those calls.
    pub total_tokens: u64,
    /// Total dollar cost across those calls.
    pub total_cost: f64,
    /// Failure description, when `status` is `Failure`.
    pub error: Option<String>,
    /// Bounded free-form metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Builder-style stage record handed to [`Monitor::add_entry`].
#[derive(Debug, Clone)]
pub struct StageRecord {
    /// Stage name.
    pub stage_name: String,
    /// Stage outcome.
    pub status: StageStatus,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// LLM calls made by the stage.
    pub llm_calls: u32,
    /// Tokens across those calls.
    pub total_tokens: u64,
    /// Dollar cost across those calls.
    pub total_cost: f64,
    /// Failure description.
    pub error: Option<String>,
    /// Free-form metadata, bounded at flush time.
    pub metadata: Option<serde_json::Value>,
}

impl StageRecord {
    /// Start a record for a stage.
    pub fn new(stage_name: impl Into<String>, status: StageStatus) -> Self {
        Self {
            stage_name: stage_name.into(),
            status,
            started_at: Utc::now(),
            duration_ms: 0,
            llm_calls: 0,
            total_tokens: 0,
            total_cost: 0.0,
            error: None,
            metadata: None,
        }
    }

    /// Set the start timestamp.
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = at;
        self
    }

    /// Set the stage duration.
    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    /// Set LLM call totals.
    pub fn llm_totals(mut self, calls: u32, tokens: u64, cost: f64) -> Self {
        self.llm_calls = calls;
        self.total_tokens = tokens;
        self.total_cost = cost;
        self
    }

    /// Attach a failure description.
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach custom metadata.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Destination for flushed monitor entries.
#[async_trait]
pub trait MonitorSink: Send + Sync {
    /// Persist a batch of entries.
    async fn post(&self, entries: &[MonitorEntry]) -> AegisResult<()>;
}

/// Per-execution telemetry collector.
#[derive(Debug)]
pub struct Monitor {
    execution_id: Uuid,
    model_name: String,
    entries: Mutex<Vec<MonitorEntry>>,
}

impl Monitor {
    /// Initialize the monitor for one execution.
    pub fn new(execution_id: Uuid, model_name: impl Into<String>) -> Self {
        Self {
            execution_id,
            model_name: model_name.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Execution this monitor belongs to.
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Append a stage record. Never fails.
    pub fn add_entry(&self, record: StageRecord) {
        let entry = MonitorEntry {
            execution_id: self.execution_id,
            model_name: self.model_name.clone(),
            stage_name: record.stage_name,
            started_at: record.started_at,
            duration_ms: record.duration_ms,
            status: record.status,
            llm_calls: record.llm_calls,
            total_tokens: record.total_tokens,
            total_cost: record.total_cost,
            error: record.error,
            metadata: record.metadata.map(bound_metadata),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Snapshot the pending entries (test and inspection helper).
    pub fn entries(&self) -> Vec<MonitorEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Drop all pending entries (test isolation).
    pub fn clear_entries(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Flush pending entries through the sink and return the count posted.
    ///
    /// Sink failures are swallowed: the error is logged, the entries are
    /// dropped, and `0` is returned. Telemetry must never take down the
    /// operation it observes.
    pub async fn post_entries(&self, sink: &dyn MonitorSink) -> usize {
        let drained: Vec<MonitorEntry> = match self.entries.lock() {
            Ok(mut entries) => entries.drain(..).collect(),
            Err(_) => return 0,
        };
        if drained.is_empty() {
            return 0;
        }

        match sink.post(&drained).await {
            Ok(()) => {
                log_debug!(
                    execution_id = %self.execution_id,
                    count = drained.len(),
                    "Monitor entries posted"
                );
                drained.len()
            }
            Err(e) => {
                log_error!(
                    execution_id = %self.execution_id,
                    count = drained.len(),
                    error = %e,
                    "Failed to post monitor entries; dropping batch"
                );
                0
            }
        }
    }
}

/// Enforce the metadata blob bound.
///
/// Oversized blobs are replaced by a marker object carrying a truncated
/// preview, so the monitor row stays storable.
fn bound_metadata(value: serde_json::Value) -> serde_json::Value {
    let serialized = value.to_string();
    if serialized.len() <= METADATA_BLOB_LIMIT {
        return value;
    }
    let preview: String = serialized.chars().take(METADATA_BLOB_LIMIT / 4).collect();
    serde_json::json!({
        "truncated": true,
        "original_bytes": serialized.len(),
        "preview": preview,
    })
}
