//! Process monitor tests.

use crate::error::{AegisError, AegisResult};
use crate::monitor::{
    Monitor, MonitorEntry, MonitorSink, StageRecord, StageStatus, METADATA_BLOB_LIMIT,
};
use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

/// Sink that records what it was asked to post.
#[derive(Default)]
struct CollectingSink {
    posted: Mutex<Vec<MonitorEntry>>,
}

#[async_trait]
impl MonitorSink for CollectingSink {
    async fn post(&self, entries: &[MonitorEntry]) -> AegisResult<()> {
        self.posted.lock().expect("sink lock").extend(entries.iter().cloned());
        Ok(())
    }
}

/// Sink that always fails.
struct FailingSink;

#[async_trait]
impl MonitorSink for FailingSink {
    async fn post(&self, _entries: &[MonitorEntry]) -> AegisResult<()> {
        Err(AegisError::upstream("sink is down", true, None))
    }
}

#[test]
fn entries_preserve_insertion_order_and_share_execution_id() {
    let monitor = Monitor::new(Uuid::new_v4(), "aegis");
    for stage in ["ssl_setup", "authentication", "router", "summarizer"] {
        monitor.add_entry(StageRecord::new(stage, StageStatus::Success));
    }

    let entries = monitor.entries();
    let stages: Vec<&str> = entries.iter().map(|e| e.stage_name.as_str()).collect();
    assert_eq!(stages, ["ssl_setup", "authentication", "router", "summarizer"]);
    assert!(entries.iter().all(|e| e.execution_id == monitor.execution_id()));
}

#[tokio::test]
async fn post_entries_drains_and_returns_count() {
    let monitor = Monitor::new(Uuid::new_v4(), "aegis");
    monitor.add_entry(StageRecord::new("one", StageStatus::Success));
    monitor.add_entry(StageRecord::new("two", StageStatus::Failure).error("boom"));

    let sink = CollectingSink::default();
    assert_eq!(monitor.post_entries(&sink).await, 2);
    assert_eq!(sink.posted.lock().expect("sink lock").len(), 2);

    // Drained: a second flush posts nothing.
    assert_eq!(monitor.post_entries(&sink).await, 0);
}

#[tokio::test]
async fn sink_failure_is_swallowed() {
    let monitor = Monitor::new(Uuid::new_v4(), "aegis");
    monitor.add_entry(StageRecord::new("one", StageStatus::Success));

    // Must not panic or propagate; returns zero.
    assert_eq!(monitor.post_entries(&FailingSink).await, 0);
}

#[test]
fn clear_entries_supports_test_isolation() {
    let monitor = Monitor::new(Uuid::new_v4(), "aegis");
    monitor.add_entry(StageRecord::new("one", StageStatus::Success));
    monitor.clear_entries();
    assert!(monitor.entries().is_empty());
}

#[test]
fn oversized_metadata_is_truncated_with_marker() {
    let monitor = Monitor::new(Uuid::new_v4(), "aegis");
    let blob = serde_json::json!({"payload": "y".repeat(METADATA_BLOB_LIMIT * 2)});
    monitor.add_entry(StageRecord::new("big", StageStatus::Success).metadata(blob));

    let entries = monitor.entries();
    let metadata = entries[0].metadata.as_ref().expect("metadata kept");
    assert_eq!(metadata["truncated"], serde_json::json!(true));
    assert!(metadata["preview"].as_str().expect("preview").len() <= METADATA_BLOB_LIMIT);
}

#[test]
fn small_metadata_passes_through_unchanged() {
    let monitor = Monitor::new(Uuid::new_v4(), "aegis");
    let blob = serde_json::json!({"db_names_requested": ["reports"], "filter_count": 1});
    monitor.add_entry(StageRecord::new("filter", StageStatus::Success).metadata(blob.clone()));

    let entries = monitor.entries();
    assert_eq!(entries[0].metadata, Some(blob));
}
