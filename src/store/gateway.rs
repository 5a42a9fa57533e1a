//! Async Postgres gateway.
//!
//! Context-scoped access to the relational store with guaranteed release,
//! named-parameter execution, and caller-owned transaction boundaries.
//! No ORM and no query builders: SQL lives next to the trait impl that
//! runs it, and string interpolation of caller-controlled values into SQL
//! is rejected before the statement reaches the wire.
//!
//! The gateway backs every store trait in the crate: prompts,
//! availability, transcripts, benchmarking, regulatory filings, reports,
//! and the monitor sink.

use super::domain::{
    AvailabilityRow, AvailabilityStore, BenchmarkMetricRow, BenchmarkingStore, DatabaseId,
    ReportRow, ReportStore, RtsExcerpt, RtsStore,
};
use crate::error::{AegisError, AegisResult};
use crate::fiscal::Quarter;
use crate::logging::{log_debug, log_error, log_warn};
use crate::monitor::{MonitorEntry, MonitorSink};
use crate::prompts::{PromptRecord, PromptStore};
use crate::settings::PostgresSettings;
use crate::transcripts::{Section, TranscriptChunk, TranscriptStore};
use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

/// Named SQL parameter list.
pub type NamedParams<'a> = &'a [(&'a str, &'a (dyn ToSql + Sync))];

/// Async gateway over one Postgres connection.
///
/// The connection driver runs on a spawned task; the client lives behind
/// an async mutex so acquisition is scoped and release is guaranteed when
/// the guard drops, including on cancellation. Transactions roll back on
/// drop if not committed, so an unwind mid-transaction never leaves one
/// open.
pub struct PgGateway {
    client: Mutex<tokio_postgres::Client>,
}

impl PgGateway {
    /// Connect and spawn the connection driver task.
    pub async fn connect(settings: &PostgresSettings) -> AegisResult<Self> {
        let (client, connection) =
            tokio_postgres::connect(&settings.connection_string(), NoTls)
                .await
                .map_err(|e| {
                    AegisError::upstream(
                        format!("Postgres connection failed: {e}"),
                        true,
                        Some(Box::new(e)),
                    )
                })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log_error!(error = %e, "Postgres connection driver exited");
            }
        });

        log_debug!(
            host = %settings.host,
            database = %settings.database,
            "Postgres gateway connected"
        );

        Ok(Self { client: Mutex::new(client) })
    }

    /// Run a query with named parameters, returning rows.
    pub async fn query(&self, sql: &str, params: NamedParams<'_>) -> AegisResult<Vec<Row>> {
        let (rewritten, ordered) = rewrite_named_params(sql, params)?;
        let client = self.client.lock().await;
        client
            .query(&rewritten, &ordered)
            .await
            .map_err(|e| db_error("query", sql, e))
    }

    /// Run a statement with named parameters, returning the affected row
    /// count.
    pub async fn execute(&self, sql: &str, params: NamedParams<'_>) -> AegisResult<u64> {
        let (rewritten, ordered) = rewrite_named_params(sql, params)?;
        let client = self.client.lock().await;
        client
            .execute(&rewritten, &ordered)
            .await
            .map_err(|e| db_error("execute", sql, e))
    }

    /// Admin-only: column names of a table, from the information schema.
    pub async fn table_columns(&self, table: &str) -> AegisResult<Vec<String>> {
        let rows = self
            .query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_name = :table ORDER BY ordinal_position",
                &[("table", &table)],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }
}

fn db_error(operation: &str, sql: &str, e: tokio_postgres::Error) -> AegisError {
    let summary: String = sql.split_whitespace().take(4).collect::<Vec<_>>().join(" ");
    AegisError::upstream(
        format!("Postgres {operation} failed ({summary} ...): {e}"),
        true,
        Some(Box::new(e)),
    )
}

/// Rewrite `:name` placeholders to positional `$n` parameters.
///
/// Rejects queries that carry `{}`-style interpolation residue, reference
/// a name with no binding, or bind a name the query never uses. `::type`
/// casts are left alone.
pub(crate) fn rewrite_named_params<'a>(
    sql: &str,
    params: NamedParams<'a>,
) -> AegisResult<(String, Vec<&'a (dyn ToSql + Sync)>)> {
    if sql.contains('{') || sql.contains('}') {
        return Err(AegisError::invariant(
            "SQL contains interpolation braces; bind values as named parameters instead",
        ));
    }

    // `(^|[^:])` keeps `::text` casts out of the match.
    static PLACEHOLDER: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let placeholder = PLACEHOLDER.get_or_init(|| {
        Regex::new(r"(^|[^:]):([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder regex is valid")
    });

    let mut ordered: Vec<&'a (dyn ToSql + Sync)> = Vec::new();
    let mut positions: Vec<(String, usize)> = Vec::new();
    let mut unbound: Vec<String> = Vec::new();

    let rewritten = placeholder
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let name = &caps[2];
            let index = match positions.iter().find(|(n, _)| n.as_str() == name) {
                Some((_, index)) => *index,
                None => match params.iter().find(|(n, _)| *n == name) {
                    Some((_, value)) => {
                        ordered.push(*value);
                        let index = ordered.len();
                        positions.push((name.to_string(), index));
                        index
                    }
                    None => {
                        unbound.push(name.to_string());
                        0
                    }
                },
            };
            format!("{prefix}${index}")
        })
        .into_owned();

    if !unbound.is_empty() {
        return Err(AegisError::invariant(format!(
            "SQL references unbound parameters: {}",
            unbound.join(", ")
        )));
    }

    let unused: Vec<&str> = params
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| !positions.iter().any(|(n, _)| n.as_str() == *name))
        .collect();
    if !unused.is_empty() {
        return Err(AegisError::invariant(format!(
            "SQL binds parameters it never uses: {}",
            unused.join(", ")
        )));
    }

    Ok((rewritten, ordered))
}

fn parse_quarter(raw: &str) -> AegisResult<Quarter> {
    Quarter::parse(raw)
        .ok_or_else(|| AegisError::invariant(format!("Stored quarter is malformed: {raw}")))
}

// ============================================================================
// Prompt store
// ============================================================================

#[async_trait]
impl PromptStore for PgGateway {
    async fn fetch_latest(&self, layer: &str, name: &str) -> AegisResult<Option<PromptRecord>> {
        let rows = self
            .query(
                "SELECT layer, name, version, description, system_prompt, user_prompt, \
                        tool_definition, uses_global \
                 FROM aegis_prompts \
                 WHERE layer = :layer AND name = :name \
                 ORDER BY created_at DESC, id DESC \
                 LIMIT 1",
                &[("layer", &layer), ("name", &name)],
            )
            .await?;

        Ok(rows.first().map(|row| PromptRecord {
            layer: row.get("layer"),
            name: row.get("name"),
            version: row.get("version"),
            description: row.get("description"),
            system_prompt: row.get("system_prompt"),
            user_prompt: row.get("user_prompt"),
            tool_definition: row.get("tool_definition"),
            uses_global: row
                .get::<_, Option<Vec<String>>>("uses_global")
                .unwrap_or_default(),
        }))
    }
}

// ============================================================================
// Availability store
// ============================================================================

#[async_trait]
impl AvailabilityStore for PgGateway {
    async fn fetch_all(&self) -> AegisResult<Vec<AvailabilityRow>> {
        let rows = self
            .query(
                "SELECT bank_id, bank_name, bank_symbol, fiscal_year, quarter, database_names \
                 FROM aegis_data_availability \
                 ORDER BY bank_id, fiscal_year, quarter",
                &[],
            )
            .await?;

        let mut parsed = Vec::with_capacity(rows.len());
        for row in &rows {
            let names: Vec<String> = row.get("database_names");
            let database_names: Vec<DatabaseId> = names
                .iter()
                .filter_map(|raw| {
                    let id = DatabaseId::parse(raw);
                    if id.is_none() {
                        log_warn!(name = %raw, "Unknown database id in availability row; skipping");
                    }
                    id
                })
                .collect();

            if database_names.is_empty() {
                log_warn!(
                    bank_id = row.get::<_, i32>("bank_id"),
                    "Availability row has no recognized databases; skipping"
                );
                continue;
            }

            parsed.push(AvailabilityRow {
                bank_id: row.get("bank_id"),
                bank_name: row.get("bank_name"),
                bank_symbol: row.get("bank_symbol"),
                fiscal_year: row.get("fiscal_year"),
                quarter: parse_quarter(row.get("quarter"))?,
                database_names,
            });
        }
        Ok(parsed)
    }
}

// ============================================================================
// Transcript store
// ============================================================================

const TRANSCRIPT_COLUMNS: &str = "bank_id, fiscal_year, quarter, section, qa_group_id, \
                                  speaker_block_id, chunk_id, chunk_text, embedding";

fn chunk_from_row(row: &Row) -> AegisResult<TranscriptChunk> {
    let section_raw: String = row.get("section");
    let section = Section::parse(&section_raw).ok_or_else(|| {
        AegisError::invariant(format!("Stored transcript section is malformed: {section_raw}"))
    })?;
    Ok(TranscriptChunk {
        bank_id: row.get("bank_id"),
        fiscal_year: row.get("fiscal_year"),
        quarter: row.get("quarter"),
        section,
        qa_group_id: row.get("qa_group_id"),
        speaker_block_id: row.get("speaker_block_id"),
        chunk_id: row.get("chunk_id"),
        text: row.get("chunk_text"),
        embedding: row
            .get::<_, Option<pgvector::Vector>>("embedding")
            .map(|v| v.to_vec()),
    })
}

fn chunks_from_rows(rows: Vec<Row>) -> AegisResult<Vec<TranscriptChunk>> {
    rows.iter().map(chunk_from_row).collect()
}

#[async_trait]
impl TranscriptStore for PgGateway {
    async fn fetch_section(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        section: Section,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        let quarter = quarter.to_string();
        let section = section.as_str();
        let sql = format!(
            "SELECT {TRANSCRIPT_COLUMNS} FROM aegis_transcripts \
             WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year \
               AND quarter = :quarter AND section = :section \
             ORDER BY qa_group_id NULLS FIRST, speaker_block_id, chunk_id"
        );
        let rows = self
            .query(
                &sql,
                &[
                    ("bank_id", &bank_id),
                    ("fiscal_year", &fiscal_year),
                    ("quarter", &quarter),
                    ("section", &section),
                ],
            )
            .await?;
        chunks_from_rows(rows)
    }

    async fn fetch_call(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        let quarter = quarter.to_string();
        let sql = format!(
            "SELECT {TRANSCRIPT_COLUMNS} FROM aegis_transcripts \
             WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year AND quarter = :quarter \
             ORDER BY section, qa_group_id NULLS FIRST, speaker_block_id, chunk_id"
        );
        let rows = self
            .query(
                &sql,
                &[
                    ("bank_id", &bank_id),
                    ("fiscal_year", &fiscal_year),
                    ("quarter", &quarter),
                ],
            )
            .await?;
        chunks_from_rows(rows)
    }

    async fn fetch_speaker_block(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        speaker_block_id: i64,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        let quarter = quarter.to_string();
        let sql = format!(
            "SELECT {TRANSCRIPT_COLUMNS} FROM aegis_transcripts \
             WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year \
               AND quarter = :quarter AND speaker_block_id = :speaker_block_id \
             ORDER BY chunk_id"
        );
        let rows = self
            .query(
                &sql,
                &[
                    ("bank_id", &bank_id),
                    ("fiscal_year", &fiscal_year),
                    ("quarter", &quarter),
                    ("speaker_block_id", &speaker_block_id),
                ],
            )
            .await?;
        chunks_from_rows(rows)
    }

    async fn fetch_qa_group(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        qa_group_id: i64,
    ) -> AegisResult<Vec<TranscriptChunk>> {
        let quarter = quarter.to_string();
        let sql = format!(
            "SELECT {TRANSCRIPT_COLUMNS} FROM aegis_transcripts \
             WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year \
               AND quarter = :quarter AND qa_group_id = :qa_group_id \
             ORDER BY speaker_block_id, chunk_id"
        );
        let rows = self
            .query(
                &sql,
                &[
                    ("bank_id", &bank_id),
                    ("fiscal_year", &fiscal_year),
                    ("quarter", &quarter),
                    ("qa_group_id", &qa_group_id),
                ],
            )
            .await?;
        chunks_from_rows(rows)
    }
}

// ============================================================================
// Benchmarking store
// ============================================================================

#[async_trait]
impl BenchmarkingStore for PgGateway {
    async fn fetch_metrics(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        platform: Option<&str>,
    ) -> AegisResult<Vec<BenchmarkMetricRow>> {
        let quarter = quarter.to_string();
        let rows = match platform {
            Some(platform) => {
                self.query(
                    "SELECT metric_name, platform, value, change FROM aegis_benchmarking \
                     WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year \
                       AND quarter = :quarter AND platform = :platform \
                     ORDER BY metric_name",
                    &[
                        ("bank_id", &bank_id),
                        ("fiscal_year", &fiscal_year),
                        ("quarter", &quarter),
                        ("platform", &platform),
                    ],
                )
                .await?
            }
            None => {
                self.query(
                    "SELECT metric_name, platform, value, change FROM aegis_benchmarking \
                     WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year \
                       AND quarter = :quarter \
                     ORDER BY platform, metric_name",
                    &[
                        ("bank_id", &bank_id),
                        ("fiscal_year", &fiscal_year),
                        ("quarter", &quarter),
                    ],
                )
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| BenchmarkMetricRow {
                metric_name: row.get("metric_name"),
                platform: row.get("platform"),
                value: row.get("value"),
                change: row.get("change"),
            })
            .collect())
    }
}

// ============================================================================
// Regulatory filings store
// ============================================================================

#[async_trait]
impl RtsStore for PgGateway {
    async fn fetch_excerpts(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<RtsExcerpt>> {
        let quarter = quarter.to_string();
        let rows = self
            .query(
                "SELECT section, excerpt, embedding FROM aegis_rts \
                 WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year AND quarter = :quarter \
                 ORDER BY section",
                &[
                    ("bank_id", &bank_id),
                    ("fiscal_year", &fiscal_year),
                    ("quarter", &quarter),
                ],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| RtsExcerpt {
                section: row.get("section"),
                text: row.get("excerpt"),
                embedding: row
                    .get::<_, Option<pgvector::Vector>>("embedding")
                    .map(|v| v.to_vec()),
            })
            .collect())
    }
}

// ============================================================================
// Report store
// ============================================================================

fn report_from_row(row: &Row) -> AegisResult<ReportRow> {
    Ok(ReportRow {
        bank_id: row.get("bank_id"),
        bank_name: row.get("bank_name"),
        bank_symbol: row.get("bank_symbol"),
        fiscal_year: row.get("fiscal_year"),
        quarter: parse_quarter(row.get("quarter"))?,
        report_type: row.get("report_type"),
        local_filepath: row.get("local_filepath"),
        s3_document_name: row.get("s3_document_name"),
        s3_pdf_name: row.get("s3_pdf_name"),
        markdown_content: row.get("markdown_content"),
        report_name: row.get("report_name"),
        report_description: row.get("report_description"),
        generated_at: row.get("generated_at"),
        execution_id: row.get("execution_id"),
    })
}

#[async_trait]
impl ReportStore for PgGateway {
    async fn fetch(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        report_type: &str,
    ) -> AegisResult<Option<ReportRow>> {
        let quarter_text = quarter.to_string();
        let rows = self
            .query(
                "SELECT bank_id, bank_name, bank_symbol, fiscal_year, quarter, report_type, \
                        local_filepath, s3_document_name, s3_pdf_name, markdown_content, \
                        report_name, report_description, generated_at, execution_id \
                 FROM aegis_reports \
                 WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year \
                   AND quarter = :quarter AND report_type = :report_type",
                &[
                    ("bank_id", &bank_id),
                    ("fiscal_year", &fiscal_year),
                    ("quarter", &quarter_text),
                    ("report_type", &report_type),
                ],
            )
            .await?;

        rows.first().map(report_from_row).transpose()
    }

    async fn fetch_all_for_period(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
    ) -> AegisResult<Vec<ReportRow>> {
        let quarter_text = quarter.to_string();
        let rows = self
            .query(
                "SELECT bank_id, bank_name, bank_symbol, fiscal_year, quarter, report_type, \
                        local_filepath, s3_document_name, s3_pdf_name, markdown_content, \
                        report_name, report_description, generated_at, execution_id \
                 FROM aegis_reports \
                 WHERE bank_id = :bank_id AND fiscal_year = :fiscal_year AND quarter = :quarter \
                 ORDER BY report_type",
                &[
                    ("bank_id", &bank_id),
                    ("fiscal_year", &fiscal_year),
                    ("quarter", &quarter_text),
                ],
            )
            .await?;
        rows.iter().map(report_from_row).collect()
    }

    async fn replace(&self, report: &ReportRow) -> AegisResult<()> {
        let quarter_text = report.quarter.to_string();
        let mut client = self.client.lock().await;
        let txn = client.transaction().await.map_err(|e| {
            AegisError::upstream(
                format!("Report replace failed (stage=begin): {e}"),
                true,
                Some(Box::new(e)),
            )
        })?;

        txn.execute(
            "DELETE FROM aegis_reports \
             WHERE bank_id = $1 AND fiscal_year = $2 AND quarter = $3 AND report_type = $4",
            &[
                &report.bank_id,
                &report.fiscal_year,
                &quarter_text,
                &report.report_type,
            ],
        )
        .await
        .map_err(|e| {
            AegisError::upstream(
                format!("Report replace failed (stage=delete): {e}"),
                true,
                Some(Box::new(e)),
            )
        })?;

        txn.execute(
            "INSERT INTO aegis_reports \
             (bank_id, bank_name, bank_symbol, fiscal_year, quarter, report_type, \
              local_filepath, s3_document_name, s3_pdf_name, markdown_content, \
              report_name, report_description, generated_at, execution_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            &[
                &report.bank_id,
                &report.bank_name,
                &report.bank_symbol,
                &report.fiscal_year,
                &quarter_text,
                &report.report_type,
                &report.local_filepath,
                &report.s3_document_name,
                &report.s3_pdf_name,
                &report.markdown_content,
                &report.report_name,
                &report.report_description,
                &report.generated_at,
                &report.execution_id,
            ],
        )
        .await
        .map_err(|e| {
            AegisError::upstream(
                format!("Report replace failed (stage=insert): {e}"),
                true,
                Some(Box::new(e)),
            )
        })?;

        // Rolls back on drop if this commit never runs.
        txn.commit().await.map_err(|e| {
            AegisError::upstream(
                format!("Report replace failed (stage=commit): {e}"),
                true,
                Some(Box::new(e)),
            )
        })
    }
}

// ============================================================================
// Monitor sink
// ============================================================================

#[async_trait]
impl MonitorSink for PgGateway {
    async fn post(&self, entries: &[MonitorEntry]) -> AegisResult<()> {
        let mut client = self.client.lock().await;
        let txn = client.transaction().await.map_err(|e| {
            AegisError::upstream(
                format!("Monitor flush failed (stage=begin): {e}"),
                true,
                Some(Box::new(e)),
            )
        })?;

        for entry in entries {
            let status = entry.status.as_str();
            txn.execute(
                "INSERT INTO aegis_process_monitor \
                 (execution_id, model_name, stage_name, started_at, duration_ms, status, \
                  llm_calls, total_tokens, total_cost, error, metadata) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    &entry.execution_id,
                    &entry.model_name,
                    &entry.stage_name,
                    &entry.started_at,
                    &(entry.duration_ms as i64),
                    &status,
                    &(entry.llm_calls as i32),
                    &(entry.total_tokens as i64),
                    &entry.total_cost,
                    &entry.error,
                    &entry.metadata,
                ],
            )
            .await
            .map_err(|e| {
                AegisError::upstream(
                    format!("Monitor flush failed (stage=insert): {e}"),
                    true,
                    Some(Box::new(e)),
                )
            })?;
        }

        txn.commit().await.map_err(|e| {
            AegisError::upstream(
                format!("Monitor flush failed (stage=commit): {e}"),
                true,
                Some(Box::new(e)),
            )
        })
    }
}
