//! Data-availability cache tests.

use crate::error::AegisResult;
use crate::fiscal::Quarter;
use crate::store::availability::load_monitored_institutions;
use crate::store::{
    AvailabilityCache, AvailabilityRow, AvailabilityStore, DatabaseId, Institution,
};
use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct MemoryAvailability {
    rows: Vec<AvailabilityRow>,
    fetches: AtomicUsize,
}

#[async_trait]
impl AvailabilityStore for MemoryAvailability {
    async fn fetch_all(&self) -> AegisResult<Vec<AvailabilityRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}

fn row(
    bank_id: i32,
    symbol: &str,
    fiscal_year: i32,
    quarter: Quarter,
    databases: &[DatabaseId],
) -> AvailabilityRow {
    AvailabilityRow {
        bank_id,
        bank_name: format!("Bank {bank_id}"),
        bank_symbol: symbol.to_string(),
        fiscal_year,
        quarter,
        database_names: databases.to_vec(),
    }
}

fn cache_with(rows: Vec<AvailabilityRow>) -> (AvailabilityCache, Arc<MemoryAvailability>) {
    let store = Arc::new(MemoryAvailability { rows, fetches: AtomicUsize::new(0) });
    (AvailabilityCache::new(Arc::clone(&store) as Arc<dyn AvailabilityStore>), store)
}

#[tokio::test]
async fn hydrates_once_and_answers_availability() {
    let (cache, store) = cache_with(vec![
        row(1, "RY-CA", 2025, Quarter::Q2, &[DatabaseId::Transcripts, DatabaseId::Reports]),
        row(2, "TD-CA", 2025, Quarter::Q2, &[DatabaseId::Benchmarking]),
    ]);

    assert!(cache
        .is_available(1, 2025, Quarter::Q2, &[DatabaseId::Reports])
        .await
        .expect("lookup"));
    assert!(!cache
        .is_available(2, 2025, Quarter::Q2, &[DatabaseId::Reports])
        .await
        .expect("lookup"));
    assert!(!cache
        .is_available(1, 2024, Quarter::Q2, &[DatabaseId::Reports])
        .await
        .expect("lookup"));

    // Read-mostly: one fetch regardless of query count.
    assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn periods_and_banks_queries_filter_by_database() {
    let (cache, _) = cache_with(vec![
        row(1, "RY-CA", 2025, Quarter::Q1, &[DatabaseId::Transcripts]),
        row(1, "RY-CA", 2025, Quarter::Q2, &[DatabaseId::Transcripts]),
        row(1, "RY-CA", 2025, Quarter::Q3, &[DatabaseId::Reports]),
        row(2, "TD-CA", 2025, Quarter::Q2, &[DatabaseId::Transcripts]),
    ]);

    let periods = cache
        .periods_for_bank(1, DatabaseId::Transcripts)
        .await
        .expect("periods");
    assert_eq!(periods, vec![(2025, Quarter::Q1), (2025, Quarter::Q2)]);

    let banks = cache
        .banks_for_period(2025, Quarter::Q2, DatabaseId::Transcripts)
        .await
        .expect("banks");
    let symbols: Vec<&str> = banks.iter().map(|b| b.symbol.as_str()).collect();
    assert_eq!(symbols, ["RY-CA", "TD-CA"]);
}

#[tokio::test]
async fn catalog_text_lists_every_row() {
    let (cache, _) = cache_with(vec![row(
        1,
        "RY-CA",
        2025,
        Quarter::Q2,
        &[DatabaseId::Transcripts, DatabaseId::Reports],
    )]);

    let catalog = cache.catalog_text().await.expect("catalog");
    assert!(catalog.contains("RY-CA"));
    assert!(catalog.contains("FY2025 Q2"));
    assert!(catalog.contains("transcripts, reports"));
}

#[tokio::test]
async fn check_mirror_tolerates_mismatches() {
    let (cache, _) = cache_with(vec![row(1, "RY-CA", 2025, Quarter::Q2, &[DatabaseId::Transcripts])]);

    // Symbol disagrees and one institution is absent; both warn, neither
    // fails, and the table's values stay authoritative.
    let mirror = vec![
        Institution { id: 1, symbol: "RY".to_string(), name: "Royal Bank".to_string(), kind: String::new() },
        Institution { id: 9, symbol: "NA-CA".to_string(), name: "National Bank".to_string(), kind: String::new() },
    ];
    cache.check_mirror(&mirror).await.expect("mirror check is non-fatal");
}

#[test]
fn monitored_institutions_yaml_parses() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "RY-CA:\n  id: 1\n  name: Royal Bank of Canada\n  type: Canadian_Banks\nTD-CA:\n  id: 2\n  name: Toronto-Dominion Bank\n  type: Canadian_Banks"
    )
    .expect("write yaml");

    let institutions = load_monitored_institutions(file.path()).expect("parses");
    assert_eq!(institutions.len(), 2);
    let ry = institutions.iter().find(|i| i.symbol == "RY-CA").expect("RY row");
    assert_eq!(ry.id, 1);
    assert_eq!(ry.kind, "Canadian_Banks");
}

#[test]
fn missing_monitored_institutions_file_is_config_error() {
    let err = load_monitored_institutions(std::path::Path::new("/no/such/file.yaml"))
        .unwrap_err();
    assert!(matches!(err, crate::error::AegisError::Config { .. }));
}
