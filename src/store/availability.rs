//! Data-availability cache and the monitored-institutions mirror.
//!
//! The data-availability table is the source of truth for institution
//! metadata. A static YAML file mirrors the institution list for ETL
//! targeting; where the two disagree the table wins and the mismatch is
//! logged once per (id, symbol) pair.

use super::domain::{AvailabilityRow, AvailabilityStore, DatabaseId};
use crate::error::{AegisError, AegisResult};
use crate::fiscal::Quarter;
use crate::logging::{log_debug, log_warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// One monitored institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    /// Stable numeric id.
    pub id: i32,
    /// Ticker symbol (e.g. `RY-CA`).
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Institution type (e.g. `Canadian_Banks`).
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// YAML entry shape: `ticker: {id, name, type}`.
#[derive(Debug, Clone, Deserialize)]
struct YamlInstitution {
    id: i32,
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// Load the monitored-institutions YAML mirror.
///
/// # Errors
///
/// Returns [`AegisError::Config`] when the file is missing or malformed.
pub fn load_monitored_institutions(path: &Path) -> AegisResult<Vec<Institution>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AegisError::config(format!(
            "Monitored institutions file not found: {} ({e})",
            path.display()
        ))
    })?;

    let parsed: BTreeMap<String, YamlInstitution> = serde_yaml::from_str(&raw)
        .map_err(|e| AegisError::config(format!("Invalid monitored institutions YAML: {e}")))?;

    Ok(parsed
        .into_iter()
        .map(|(symbol, info)| Institution {
            id: info.id,
            symbol,
            name: info.name,
            kind: info.kind,
        })
        .collect())
}

/// Read-mostly cache over the data-availability table.
///
/// Hydrated on first use and shared process-wide; the underlying table
/// changes only between ETL cycles, so a per-process snapshot is accurate
/// enough for routing decisions.
pub struct AvailabilityCache {
    store: Arc<dyn AvailabilityStore>,
    rows: OnceCell<Vec<AvailabilityRow>>,
}

impl AvailabilityCache {
    /// Create a cache over the availability store.
    pub fn new(store: Arc<dyn AvailabilityStore>) -> Self {
        Self { store, rows: OnceCell::new() }
    }

    /// All availability rows, fetching on first call.
    pub async fn rows(&self) -> AegisResult<&[AvailabilityRow]> {
        let rows = self
            .rows
            .get_or_try_init(|| async {
                let rows = self.store.fetch_all().await?;
                log_debug!(row_count = rows.len(), "Data-availability table hydrated");
                Ok::<_, AegisError>(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Whether (bank, period) has data in at least one of `databases`.
    pub async fn is_available(
        &self,
        bank_id: i32,
        fiscal_year: i32,
        quarter: Quarter,
        databases: &[DatabaseId],
    ) -> AegisResult<bool> {
        Ok(self.rows().await?.iter().any(|row| {
            row.bank_id == bank_id
                && row.fiscal_year == fiscal_year
                && row.quarter == quarter
                && row.database_names.iter().any(|db| databases.contains(db))
        }))
    }

    /// Periods with `database` data for one bank.
    pub async fn periods_for_bank(
        &self,
        bank_id: i32,
        database: DatabaseId,
    ) -> AegisResult<Vec<(i32, Quarter)>> {
        Ok(self
            .rows()
            .await?
            .iter()
            .filter(|row| row.bank_id == bank_id && row.database_names.contains(&database))
            .map(|row| (row.fiscal_year, row.quarter))
            .collect())
    }

    /// Banks with `database` data for one period.
    pub async fn banks_for_period(
        &self,
        fiscal_year: i32,
        quarter: Quarter,
        database: DatabaseId,
    ) -> AegisResult<Vec<Institution>> {
        Ok(self
            .rows()
            .await?
            .iter()
            .filter(|row| {
                row.fiscal_year == fiscal_year
                    && row.quarter == quarter
                    && row.database_names.contains(&database)
            })
            .map(|row| Institution {
                id: row.bank_id,
                symbol: row.bank_symbol.clone(),
                name: row.bank_name.clone(),
                kind: String::new(),
            })
            .collect())
    }

    /// Compact catalog text for the clarifier prompt: each bank with its
    /// covered periods and databases.
    pub async fn catalog_text(&self) -> AegisResult<String> {
        let mut lines: Vec<String> = self
            .rows()
            .await?
            .iter()
            .map(|row| {
                format!(
                    "- {} ({}, id {}): FY{} {} [{}]",
                    row.bank_name,
                    row.bank_symbol,
                    row.bank_id,
                    row.fiscal_year,
                    row.quarter,
                    row.database_names
                        .iter()
                        .map(DatabaseId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
            .collect();
        lines.sort();
        Ok(lines.join("\n"))
    }

    /// Compare the YAML mirror against the table and warn on mismatches.
    ///
    /// The table is authoritative; this only surfaces drift so the mirror
    /// can be corrected.
    pub async fn check_mirror(&self, mirror: &[Institution]) -> AegisResult<()> {
        let rows = self.rows().await?;
        for institution in mirror {
            let table_row = rows.iter().find(|row| row.bank_id == institution.id);
            match table_row {
                Some(row) if row.bank_symbol != institution.symbol => {
                    log_warn!(
                        bank_id = institution.id,
                        yaml_symbol = %institution.symbol,
                        table_symbol = %row.bank_symbol,
                        "Monitored-institutions YAML disagrees with availability table; table wins"
                    );
                }
                Some(_) => {}
                None => {
                    log_warn!(
                        bank_id = institution.id,
                        symbol = %institution.symbol,
                        "Monitored institution has no availability rows"
                    );
                }
            }
        }
        Ok(())
    }
}
