//! Report persistence: render, upload, and register.
//!
//! Uploads the rendered document under its deterministic name, writes the
//! local copy when an output path was requested, and replaces the reports
//! row (DELETE then INSERT in one transaction; the gateway labels which
//! half failed).

use super::document::{DocumentRenderer, ReportDocument};
use crate::context::ExecutionContext;
use crate::error::AegisResult;
use crate::fiscal::Quarter;
use crate::logging::{log_debug, log_info};
use crate::store::object::document_name;
use crate::store::{Institution, ObjectStore, ReportRow, ReportStore};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Descriptive fields for the persisted row.
#[derive(Debug, Clone)]
pub struct ReportDescriptor {
    /// Report type key (unique per bank and period).
    pub report_type: String,
    /// Display name.
    pub report_name: String,
    /// Display description.
    pub report_description: String,
}

/// Render, upload, and register one bank's report.
///
/// Returns the persisted row. Rendering validates non-emptiness first, so
/// an empty document never reaches storage.
pub async fn persist_report(
    document: &ReportDocument,
    descriptor: &ReportDescriptor,
    bank: &Institution,
    fiscal_year: i32,
    quarter: Quarter,
    renderer: &dyn DocumentRenderer,
    object_store: &dyn ObjectStore,
    report_store: &dyn ReportStore,
    output_path: Option<&Path>,
    ctx: &ExecutionContext,
) -> AegisResult<ReportRow> {
    document.validate_non_empty()?;

    let markdown = document.render_markdown();
    let docx_bytes = renderer.render_docx(document)?;
    let docx_name = document_name(&bank.symbol, fiscal_year, quarter, &docx_bytes, "docx");

    let pdf_name = match renderer.render_pdf(document)? {
        Some(pdf_bytes) => {
            let name = document_name(&bank.symbol, fiscal_year, quarter, &pdf_bytes, "pdf");
            object_store.upload(&name, &pdf_bytes).await?;
            Some(name)
        }
        None => None,
    };

    object_store.upload(&docx_name, &docx_bytes).await?;

    let local_filepath = match output_path {
        Some(dir) => {
            let file_name = docx_name.rsplit('/').next().unwrap_or(&docx_name);
            let path: PathBuf = dir.join(file_name);
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                crate::error::AegisError::config(format!(
                    "Cannot create output directory {}: {e}",
                    dir.display()
                ))
            })?;
            tokio::fs::write(&path, &docx_bytes).await.map_err(|e| {
                crate::error::AegisError::config(format!(
                    "Cannot write document {}: {e}",
                    path.display()
                ))
            })?;
            log_debug!(path = %path.display(), "Local document written");
            path.display().to_string()
        }
        None => String::new(),
    };

    let row = ReportRow {
        bank_id: bank.id,
        bank_name: bank.name.clone(),
        bank_symbol: bank.symbol.clone(),
        fiscal_year,
        quarter,
        report_type: descriptor.report_type.clone(),
        local_filepath,
        s3_document_name: docx_name.clone(),
        s3_pdf_name: pdf_name,
        markdown_content: Some(markdown),
        report_name: descriptor.report_name.clone(),
        report_description: descriptor.report_description.clone(),
        generated_at: Utc::now(),
        execution_id: ctx.execution_id,
    };

    report_store.replace(&row).await?;

    log_info!(
        execution_id = %ctx.execution_id,
        bank_symbol = %bank.symbol,
        report_type = %descriptor.report_type,
        document = %docx_name,
        "Report persisted"
    );
    Ok(row)
}
