//! Reports subagent.
//!
//! Looks up pre-built report rows for each combination. When a rendered
//! document exists, the subagent streams its object-store URL and a short
//! markdown summary; when a row exists without content, it emits exactly
//! the [`NO_REPORT_CONTENT`] sentinel.

use super::{Subagent, SubagentRequest, DATA_UNAVAILABLE_NOTE};
use crate::context::ExecutionContext;
use crate::monitor::{StageRecord, StageStatus};
use crate::pipeline::clarifier::BankPeriodCombination;
use crate::pipeline::events::PipelineEvent;
use crate::store::{DatabaseId, ReportRow, ReportStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Sentinel emitted for a report row with no rendered content.
///
/// Tests depend on this exact text.
pub const NO_REPORT_CONTENT: &str = "*No content available for this report.*";

/// Longest markdown summary streamed per report.
const SUMMARY_CHARS: usize = 1200;

/// Subagent over the pre-built report registry.
pub struct ReportsSubagent {
    store: Arc<dyn ReportStore>,
}

impl ReportsSubagent {
    /// Build the subagent over the report store.
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    fn format_report(combination: &BankPeriodCombination, report: &ReportRow) -> String {
        let mut text = format!(
            "**{}** for {} (FY{} {})\n\nDocument: {}\n\n",
            report.report_name,
            combination.bank_name,
            report.fiscal_year,
            report.quarter,
            report.s3_document_name,
        );

        match report.markdown_content.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(content) => {
                let summary: String = content.chars().take(SUMMARY_CHARS).collect();
                text.push_str(&summary);
                if content.chars().count() > SUMMARY_CHARS {
                    text.push_str("...");
                }
            }
            None => text.push_str(NO_REPORT_CONTENT),
        }
        text.push('\n');
        text
    }
}

#[async_trait]
impl Subagent for ReportsSubagent {
    fn database(&self) -> DatabaseId {
        DatabaseId::Reports
    }

    async fn run(
        &self,
        request: SubagentRequest,
        ctx: Arc<ExecutionContext>,
        tx: mpsc::Sender<PipelineEvent>,
    ) {
        let started = Instant::now();
        let mut failure: Option<String> = None;

        let _ = tx.send(PipelineEvent::subagent_start(self.database().as_str())).await;

        for combination in &request.combinations {
            match self
                .store
                .fetch_all_for_period(
                    combination.bank_id,
                    combination.fiscal_year,
                    combination.quarter,
                )
                .await
            {
                Ok(reports) if reports.is_empty() => {
                    let note = format!(
                        "No pre-built reports exist for {} in FY{} {}.\n",
                        combination.bank_name, combination.fiscal_year, combination.quarter
                    );
                    let _ = tx
                        .send(PipelineEvent::subagent(self.database().as_str(), note))
                        .await;
                }
                Ok(reports) => {
                    for report in &reports {
                        let text = Self::format_report(combination, report);
                        if tx
                            .send(PipelineEvent::subagent(self.database().as_str(), text))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    let _ = tx
                        .send(PipelineEvent::subagent(
                            self.database().as_str(),
                            format!("{DATA_UNAVAILABLE_NOTE}\n"),
                        ))
                        .await;
                }
            }
        }

        let status =
            if failure.is_some() { StageStatus::Failure } else { StageStatus::Success };
        let mut record = StageRecord::new("subagent_reports", status)
            .duration_ms(started.elapsed().as_millis() as u64);
        if let Some(error) = failure {
            record = record.error(error);
        }
        ctx.monitor.add_entry(record);
    }
}
