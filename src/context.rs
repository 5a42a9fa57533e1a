//! Execution context threaded through every component.
//!
//! An [`ExecutionContext`] is created at the top of every request or ETL
//! run and borrowed by everything downstream. It carries the execution id,
//! the resolved auth credential and SSL settings, the per-execution
//! [`Monitor`], and the LLM cost ledger the connector appends to.

use crate::auth::AuthConfig;
use crate::monitor::Monitor;
use crate::ssl::SslConfig;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// One LLM call's cost accounting, appended by the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCostRecord {
    /// Model that served the call.
    pub model: String,
    /// Prompt tokens reported by the provider (0 when absent).
    pub prompt_tokens: u64,
    /// Completion tokens reported by the provider (0 when absent).
    pub completion_tokens: u64,
    /// Total tokens reported by the provider (0 when absent).
    pub total_tokens: u64,
    /// Dollar cost from the configured tier rates (0 for unknown models).
    pub cost: f64,
}

/// Aggregated view of a cost ledger drain.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostTotals {
    /// Number of LLM calls.
    pub llm_calls: u32,
    /// Total tokens across the calls.
    pub total_tokens: u64,
    /// Total dollar cost across the calls.
    pub total_cost: f64,
}

/// Immutable-per-call execution record.
///
/// Created once at the outermost caller; components borrow it. The cost
/// ledger and monitor are interior-mutable so borrowers can append without
/// threading `&mut` through the call tree.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Unique id for this request or ETL run.
    pub execution_id: Uuid,
    /// Resolved bearer credential.
    pub auth: AuthConfig,
    /// Resolved TLS trust configuration.
    pub ssl: SslConfig,
    /// Per-execution telemetry sink.
    pub monitor: Monitor,
    costs: Mutex<Vec<LlmCostRecord>>,
}

impl ExecutionContext {
    /// Create a context with a fresh execution id.
    pub fn new(auth: AuthConfig, ssl: SslConfig, model_name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), auth, ssl, model_name)
    }

    /// Create a context for an execution id generated by the caller (the
    /// id is logged before auth runs, so it exists first).
    pub fn with_id(
        execution_id: Uuid,
        auth: AuthConfig,
        ssl: SslConfig,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            auth,
            ssl,
            monitor: Monitor::new(execution_id, model_name),
            costs: Mutex::new(Vec::new()),
        }
    }

    /// Record one LLM call's cost into the ledger.
    pub fn record_llm_cost(&self, record: LlmCostRecord) {
        if let Ok(mut costs) = self.costs.lock() {
            costs.push(record);
        }
    }

    /// Drain the ledger, returning aggregate totals.
    ///
    /// Stages call this when they finish so each monitor entry carries the
    /// calls made since the previous drain.
    pub fn drain_llm_costs(&self) -> CostTotals {
        let drained: Vec<LlmCostRecord> = match self.costs.lock() {
            Ok(mut costs) => costs.drain(..).collect(),
            Err(_) => return CostTotals::default(),
        };
        let mut totals = CostTotals::default();
        for record in &drained {
            totals.llm_calls += 1;
            totals.total_tokens += record.total_tokens;
            totals.total_cost += record.cost;
        }
        totals
    }

    /// Snapshot the ledger without draining (inspection helper).
    pub fn llm_costs(&self) -> Vec<LlmCostRecord> {
        self.costs.lock().map(|c| c.clone()).unwrap_or_default()
    }
}
