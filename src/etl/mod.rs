//! Batch ETL framework.
//!
//! Shared skeleton for the report ETLs: per-ETL config with model tiers,
//! category templates, bank fan-out under bounded concurrency, per-bank
//! category-driven extraction, document assembly, idempotent persistence,
//! and telemetry. The concrete ETLs (call summary, key themes, capital-
//! markets readthrough, wealth-management readthrough, bank earnings)
//! instantiate the framework with their prompts, categories, and layout;
//! everything else is shared.

pub mod bank_earnings;
pub mod call_summary;
pub mod categories;
pub mod cm_readthrough;
pub mod config;
pub mod document;
pub mod extraction;
pub mod key_themes;
pub mod persist;
pub mod wm_readthrough;

pub use bank_earnings::generate_bank_earnings_report;
pub use call_summary::generate_call_summary;
pub use categories::{Category, SectionScope};
pub use cm_readthrough::generate_cm_readthrough;
pub use config::EtlConfig;
pub use document::{auto_bold, select_featured_items, DocSection, DocumentRenderer, ReportDocument};
pub use extraction::ExtractedStatement;
pub use key_themes::generate_key_themes;
pub use persist::ReportDescriptor;
pub use wm_readthrough::generate_wm_readthrough;

use crate::assistant::Aegis;
use crate::auth::setup_authentication;
use crate::context::ExecutionContext;
use crate::error::{AegisError, AegisResult};
use crate::fiscal::Quarter;
use crate::logging::{log_info, log_warn};
use crate::monitor::{StageRecord, StageStatus};
use crate::store::{DatabaseId, Institution};
use crate::transcripts::Section;
use async_trait::async_trait;
use extraction::{extract_category, ExtractionInput};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Result of one ETL driver run.
#[derive(Debug, Clone, PartialEq)]
pub struct EtlOutcome {
    /// Output directory the documents were written to, when requested.
    pub filepath: Option<PathBuf>,
    /// Banks the run attempted (gap-skipped banks excluded).
    pub banks_processed: usize,
    /// Banks that produced a persisted report.
    pub banks_with_content: usize,
    /// Run metrics: skips, failures, rejected extraction counts.
    pub metrics: serde_json::Value,
}

/// Rendered text of both transcript sections for one bank and period.
#[derive(Debug, Clone, Default)]
pub struct SectionTexts {
    /// Management-discussion text.
    pub md: String,
    /// Question-and-answer text.
    pub qa: String,
}

impl SectionTexts {
    /// Text covered by a category scope. `ALL` concatenates both halves.
    pub fn for_scope(&self, scope: SectionScope) -> String {
        match scope {
            SectionScope::MD => self.md.clone(),
            SectionScope::QA => self.qa.clone(),
            SectionScope::All => {
                if self.md.is_empty() {
                    self.qa.clone()
                } else if self.qa.is_empty() {
                    self.md.clone()
                } else {
                    format!("{}\n\n{}", self.md, self.qa)
                }
            }
        }
    }

    /// Whether neither section has content.
    pub fn is_empty(&self) -> bool {
        self.md.is_empty() && self.qa.is_empty()
    }
}

/// One concrete ETL: prompts, categories, and document layout.
///
/// `extract_bank` has a default body running category-scoped extraction
/// over the transcript sections; ETLs that pull in additional sources
/// (the bank-earnings report reads regulatory filings too) override it.
#[async_trait]
pub trait EtlDefinition: Send + Sync {
    /// Persisted-row descriptor (type, name, description).
    fn descriptor(&self) -> ReportDescriptor;

    /// Prompt registry layer for this ETL.
    fn prompt_layer(&self) -> &'static str;

    /// Resolved configuration.
    fn config(&self) -> &EtlConfig;

    /// Category template.
    fn categories(&self) -> &[Category];

    /// Content-type slot for the extraction prompt.
    fn content_type(&self) -> &'static str {
        "earnings call transcript"
    }

    /// Extract statements for one bank.
    async fn extract_bank(
        &self,
        services: &Aegis,
        bank: &Institution,
        fiscal_year: i32,
        quarter: Quarter,
        sections: &SectionTexts,
        ctx: &ExecutionContext,
    ) -> AegisResult<Vec<ExtractedStatement>> {
        extract_all_categories(
            services,
            self.prompt_layer(),
            self.config(),
            self.categories(),
            self.content_type(),
            bank,
            fiscal_year,
            quarter,
            sections,
            ctx,
        )
        .await
    }

    /// Assemble the document for one bank, or `None` when the bank has no
    /// content worth rendering.
    async fn build_document(
        &self,
        services: &Aegis,
        bank: &Institution,
        fiscal_year: i32,
        quarter: Quarter,
        statements: Vec<ExtractedStatement>,
        ctx: &ExecutionContext,
    ) -> AegisResult<Option<ReportDocument>>;
}

/// Default per-bank extraction: every applicable category over its scoped
/// section text.
#[allow(clippy::too_many_arguments)]
pub async fn extract_all_categories(
    services: &Aegis,
    prompt_layer: &str,
    config: &EtlConfig,
    categories: &[Category],
    content_type: &str,
    bank: &Institution,
    fiscal_year: i32,
    quarter: Quarter,
    sections: &SectionTexts,
    ctx: &ExecutionContext,
) -> AegisResult<Vec<ExtractedStatement>> {
    let quarter_text = quarter.to_string();
    let mut statements = Vec::new();

    for category in categories {
        let content = sections.for_scope(category.transcript_sections);
        if content.is_empty() {
            continue;
        }

        let input = ExtractionInput {
            bank_name: &bank.name,
            fiscal_year,
            quarter: &quarter_text,
            transcript_content: &content,
            content_type,
        };

        let extracted = extract_category(
            services.llm.as_ref(),
            &services.prompts,
            config,
            prompt_layer,
            category,
            categories,
            &input,
            ctx,
        )
        .await?;
        statements.extend(extracted);
    }
    Ok(statements)
}

/// Outcome of one bank's work inside the fan-out.
#[derive(Debug)]
enum BankOutcome {
    Generated { rejected: usize },
    NoContent,
    Skipped,
    Failed(String),
}

/// Run one ETL over every applicable bank for a period.
///
/// # Errors
///
/// - [`AegisError::Auth`] when credential acquisition fails (system
///   error class).
/// - [`AegisError::UserError`] when no bank has transcript data for the
///   period.
pub async fn run_etl(
    services: &Aegis,
    definition: Arc<dyn EtlDefinition>,
    fiscal_year: i32,
    quarter: Quarter,
    output_path: Option<PathBuf>,
) -> AegisResult<EtlOutcome> {
    let descriptor = definition.descriptor();
    let execution_id = Uuid::new_v4();
    log_info!(
        execution_id = %execution_id,
        report_type = %descriptor.report_type,
        fiscal_year = fiscal_year,
        quarter = %quarter,
        "etl.started"
    );

    let auth = setup_authentication(
        &execution_id.to_string(),
        &services.ssl,
        &services.settings,
    )
    .await?;
    if !auth.success {
        return Err(AegisError::auth(
            auth.error.unwrap_or_else(|| "Credential acquisition failed".to_string()),
        ));
    }

    let ctx = Arc::new(ExecutionContext::with_id(
        execution_id,
        auth,
        services.ssl.clone(),
        descriptor.report_type.clone(),
    ));

    let mut banks = services
        .availability
        .banks_for_period(fiscal_year, quarter, DatabaseId::Transcripts)
        .await?;

    // When a monitored-institutions mirror is configured, the run is
    // restricted to it; the availability table stays authoritative for
    // metadata, and mismatches are logged as warnings.
    if let Ok(path) = std::env::var("MONITORED_INSTITUTIONS_PATH") {
        if !path.is_empty() {
            let mirror =
                crate::store::availability::load_monitored_institutions(path.as_ref())?;
            services.availability.check_mirror(&mirror).await?;
            banks.retain(|bank| mirror.iter().any(|m| m.id == bank.id));
        }
    }

    if banks.is_empty() {
        return Err(AegisError::user(format!(
            "No banks have transcript data for FY{fiscal_year} {quarter}"
        )));
    }

    let semaphore = Arc::new(Semaphore::new(definition.config().max_concurrent));
    let mut handles = Vec::with_capacity(banks.len());

    for bank in banks {
        let services = services.clone();
        let definition = Arc::clone(&definition);
        let descriptor = descriptor.clone();
        let semaphore = Arc::clone(&semaphore);
        let ctx = Arc::clone(&ctx);
        let output_path = output_path.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return BankOutcome::Failed("Worker pool closed".to_string());
            };
            process_bank(
                &services,
                definition.as_ref(),
                &descriptor,
                &bank,
                fiscal_year,
                quarter,
                output_path.as_deref(),
                &ctx,
            )
            .await
        }));
    }

    let mut processed = 0usize;
    let mut with_content = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    let mut rejected_total = 0usize;

    for handle in handles {
        match handle.await {
            Ok(BankOutcome::Generated { rejected }) => {
                processed += 1;
                with_content += 1;
                rejected_total += rejected;
            }
            Ok(BankOutcome::NoContent) => processed += 1,
            Ok(BankOutcome::Skipped) => skipped += 1,
            Ok(BankOutcome::Failed(_)) => {
                processed += 1;
                failed += 1;
            }
            Err(e) => {
                log_warn!(execution_id = %ctx.execution_id, error = %e, "Bank worker panicked");
                failed += 1;
            }
        }
    }

    let totals = ctx.drain_llm_costs();
    ctx.monitor.add_entry(
        StageRecord::new("etl_run", StageStatus::Success)
            .llm_totals(totals.llm_calls, totals.total_tokens, totals.total_cost)
            .metadata(serde_json::json!({
                "report_type": descriptor.report_type,
                "fiscal_year": fiscal_year,
                "quarter": quarter.to_string(),
                "banks_processed": processed,
                "banks_with_content": with_content,
                "banks_skipped": skipped,
                "banks_failed": failed,
            })),
    );
    ctx.monitor.post_entries(services.monitor_sink.as_ref()).await;

    log_info!(
        execution_id = %ctx.execution_id,
        report_type = %descriptor.report_type,
        banks_processed = processed,
        banks_with_content = with_content,
        "etl.completed"
    );

    Ok(EtlOutcome {
        filepath: output_path,
        banks_processed: processed,
        banks_with_content: with_content,
        metrics: serde_json::json!({
            "banks_skipped": skipped,
            "banks_failed": failed,
            "rejected_statements": rejected_total,
            "llm_calls": totals.llm_calls,
            "total_tokens": totals.total_tokens,
            "total_cost": totals.total_cost,
        }),
    })
}

/// One bank's pipeline: gap check, retrieval, extraction, assembly,
/// persistence, telemetry.
#[allow(clippy::too_many_arguments)]
async fn process_bank(
    services: &Aegis,
    definition: &dyn EtlDefinition,
    descriptor: &ReportDescriptor,
    bank: &Institution,
    fiscal_year: i32,
    quarter: Quarter,
    output_path: Option<&std::path::Path>,
    ctx: &Arc<ExecutionContext>,
) -> BankOutcome {
    let started = Instant::now();

    // Idempotence: a covered (bank, period, type) is not a gap.
    match services
        .reports
        .fetch(bank.id, fiscal_year, quarter, &descriptor.report_type)
        .await
    {
        Ok(Some(_)) => {
            log_info!(
                execution_id = %ctx.execution_id,
                bank_symbol = %bank.symbol,
                report_type = %descriptor.report_type,
                "Report already exists; skipping"
            );
            return BankOutcome::Skipped;
        }
        Ok(None) => {}
        Err(e) => return fail_bank(ctx, bank, started, e.to_string()),
    }

    let sections = match fetch_sections(services, bank, fiscal_year, quarter).await {
        Ok(sections) => sections,
        Err(e) => return fail_bank(ctx, bank, started, e.to_string()),
    };
    if sections.is_empty() {
        log_warn!(
            execution_id = %ctx.execution_id,
            bank_symbol = %bank.symbol,
            "No transcript content for bank; nothing to extract"
        );
        return BankOutcome::NoContent;
    }

    let statements = match definition
        .extract_bank(services, bank, fiscal_year, quarter, &sections, ctx)
        .await
    {
        Ok(statements) => statements,
        Err(e) => return fail_bank(ctx, bank, started, e.to_string()),
    };
    let rejected = statements.iter().filter(|s| s.rejected).count();

    let document = match definition
        .build_document(services, bank, fiscal_year, quarter, statements, ctx)
        .await
    {
        Ok(document) => document,
        Err(e) => return fail_bank(ctx, bank, started, e.to_string()),
    };

    let outcome = match document {
        Some(document) => {
            match persist::persist_report(
                &document,
                descriptor,
                bank,
                fiscal_year,
                quarter,
                services.renderer.as_ref(),
                services.object_store.as_ref(),
                services.reports.as_ref(),
                output_path,
                ctx,
            )
            .await
            {
                Ok(_) => BankOutcome::Generated { rejected },
                Err(e) => return fail_bank(ctx, bank, started, e.to_string()),
            }
        }
        None => BankOutcome::NoContent,
    };

    ctx.monitor.add_entry(
        StageRecord::new(format!("bank_{}", bank.symbol), StageStatus::Success)
            .duration_ms(started.elapsed().as_millis() as u64)
            .metadata(serde_json::json!({
                "bank_id": bank.id,
                "rejected_statements": rejected,
                "generated": matches!(outcome, BankOutcome::Generated { .. }),
            })),
    );
    outcome
}

fn fail_bank(
    ctx: &ExecutionContext,
    bank: &Institution,
    started: Instant,
    error: String,
) -> BankOutcome {
    ctx.monitor.add_entry(
        StageRecord::new(format!("bank_{}", bank.symbol), StageStatus::Failure)
            .duration_ms(started.elapsed().as_millis() as u64)
            .error(error.clone()),
    );
    BankOutcome::Failed(error)
}

async fn fetch_sections(
    services: &Aegis,
    bank: &Institution,
    fiscal_year: i32,
    quarter: Quarter,
) -> AegisResult<SectionTexts> {
    let md = services
        .transcripts
        .fetch_section(bank.id, fiscal_year, quarter, Section::MD)
        .await?;
    let qa = services
        .transcripts
        .fetch_section(bank.id, fiscal_year, quarter, Section::QA)
        .await?;

    let join = |chunks: Vec<crate::transcripts::TranscriptChunk>| {
        chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n")
    };
    Ok(SectionTexts { md: join(md), qa: join(qa) })
}
