//! Prompt registry tests.

use super::test_context;
use crate::error::{AegisError, AegisResult};
use crate::prompts::{render_template, PromptRecord, PromptRegistry, PromptStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory store pre-seeded with highest-version records.
#[derive(Default)]
struct MemoryPromptStore {
    records: HashMap<(String, String), PromptRecord>,
    fetches: AtomicUsize,
}

impl MemoryPromptStore {
    fn with(record: PromptRecord) -> Self {
        let mut store = Self::default();
        store
            .records
            .insert((record.layer.clone(), record.name.clone()), record);
        store
    }
}

#[async_trait]
impl PromptStore for MemoryPromptStore {
    async fn fetch_latest(&self, layer: &str, name: &str) -> AegisResult<Option<PromptRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .get(&(layer.to_string(), name.to_string()))
            .cloned())
    }
}

fn record(layer: &str, name: &str, version: &str) -> PromptRecord {
    PromptRecord {
        layer: layer.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        description: "test prompt".to_string(),
        system_prompt: "You answer questions.".to_string(),
        user_prompt: None,
        tool_definition: None,
        uses_global: Vec::new(),
    }
}

#[tokio::test]
async fn serves_the_stored_record() {
    let store = Arc::new(MemoryPromptStore::with(record("router", "route_query", "3")));
    let registry = PromptRegistry::new(store);
    let ctx = test_context();

    let loaded = registry
        .load_prompt("router", "route_query", false, &ctx)
        .await
        .expect("loads");
    assert_eq!(loaded.system_prompt, "You answer questions.");
    assert!(loaded.tool_definition.is_none());
}

#[tokio::test]
async fn missing_prompt_is_prompt_not_found() {
    let registry = PromptRegistry::new(Arc::new(MemoryPromptStore::default()));
    let ctx = test_context();

    let err = registry
        .load_prompt("router", "missing", false, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AegisError::PromptNotFound { .. }));
}

#[tokio::test]
async fn caches_after_first_load() {
    let store = Arc::new(MemoryPromptStore::with(record("router", "route_query", "1")));
    let registry = PromptRegistry::new(Arc::clone(&store) as Arc<dyn PromptStore>);
    let ctx = test_context();

    for _ in 0..3 {
        registry
            .load_prompt("router", "route_query", false, &ctx)
            .await
            .expect("loads");
    }
    assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn composes_globals_in_list_order() {
    let mut prompt = record("summarizer", "synthesize_answer", "1");
    prompt.uses_global =
        vec!["aegis_identity".to_string(), "fiscal_context".to_string()];
    let registry = PromptRegistry::new(Arc::new(MemoryPromptStore::with(prompt)));
    let ctx = test_context();

    let loaded = registry
        .load_prompt("summarizer", "synthesize_answer", true, &ctx)
        .await
        .expect("loads");

    let identity_pos = loaded
        .system_prompt
        .find("You are Aegis")
        .expect("identity block present");
    let fiscal_pos = loaded
        .system_prompt
        .find("Fiscal Period Context:")
        .expect("fiscal block present");
    let body_pos = loaded
        .system_prompt
        .find("You answer questions.")
        .expect("body present");
    assert!(identity_pos < fiscal_pos && fiscal_pos < body_pos);
}

#[tokio::test]
async fn skipping_globals_leaves_system_text_alone() {
    let mut prompt = record("summarizer", "synthesize_answer", "1");
    prompt.uses_global = vec!["fiscal_context".to_string()];
    let registry = PromptRegistry::new(Arc::new(MemoryPromptStore::with(prompt)));
    let ctx = test_context();

    let loaded = registry
        .load_prompt("summarizer", "synthesize_answer", false, &ctx)
        .await
        .expect("loads");
    assert_eq!(loaded.system_prompt, "You answer questions.");
}

#[tokio::test]
async fn double_encoded_tool_definition_is_reparsed() {
    let mut prompt = record("clarifier", "clarify_query", "2");
    // A string where an object belongs: the double-encoded upload case.
    prompt.tool_definition = Some(serde_json::Value::String(
        r#"{"type": "object", "properties": {}}"#.to_string(),
    ));
    let registry = PromptRegistry::new(Arc::new(MemoryPromptStore::with(prompt)));
    let ctx = test_context();

    let loaded = registry
        .load_prompt("clarifier", "clarify_query", false, &ctx)
        .await
        .expect("loads");
    let tool = loaded.tool_definition.expect("tool definition kept");
    assert!(tool.is_object(), "string payload should be re-parsed to an object");
    assert_eq!(tool["type"], serde_json::json!("object"));
}

#[test]
fn render_template_fills_known_and_keeps_unknown() {
    let rendered = render_template(
        "Bank {bank_name} in {quarter}; future: {not_yet_defined}",
        &[("bank_name", "RBC"), ("quarter", "Q2")],
    );
    assert_eq!(rendered, "Bank RBC in Q2; future: {not_yet_defined}");
}
