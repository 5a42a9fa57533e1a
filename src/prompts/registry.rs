//! Versioned prompt records and the registry that serves them.
//!
//! Records are fetched through the [`PromptStore`] trait (the relational
//! gateway provides the SQL implementation) and cached per (layer, name)
//! after first load. There is no hot reload; a cached record is served for
//! the life of the process, which also guarantees that the version a
//! caller observes never goes backwards.

use super::globals::resolve_global;
use crate::context::ExecutionContext;
use crate::error::{AegisError, AegisResult};
use crate::logging::{log_debug, log_warn};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One stored prompt version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    /// Prompt layer (e.g. `router`, `call_summary_etl`).
    pub layer: String,
    /// Prompt name within the layer.
    pub name: String,
    /// Opaque version string; the store returns the most recently
    /// inserted row per (layer, name).
    pub version: String,
    /// Human description.
    pub description: String,
    /// Templated system text.
    pub system_prompt: String,
    /// Templated user text, when the prompt carries one.
    pub user_prompt: Option<String>,
    /// Tool schema, when the prompt drives a tool call.
    pub tool_definition: Option<serde_json::Value>,
    /// Global prompt ids to prepend, in order.
    pub uses_global: Vec<String>,
}

/// A prompt resolved for use: globals composed, tool schema normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPrompt {
    /// System text with referenced globals prepended.
    pub system_prompt: String,
    /// User template, when present.
    pub user_prompt: Option<String>,
    /// Tool schema, when present.
    pub tool_definition: Option<serde_json::Value>,
}

/// Backing store for prompt records.
///
/// `fetch_latest` must return the highest-version row for the key, or
/// `None` when the key has no rows at all.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Fetch the most recent record for (layer, name).
    async fn fetch_latest(&self, layer: &str, name: &str) -> AegisResult<Option<PromptRecord>>;
}

/// Process-wide, read-mostly prompt cache.
pub struct PromptRegistry {
    store: Arc<dyn PromptStore>,
    cache: RwLock<HashMap<(String, String), PromptRecord>>,
}

impl PromptRegistry {
    /// Create a registry over a backing store.
    pub fn new(store: Arc<dyn PromptStore>) -> Self {
        Self { store, cache: RwLock::new(HashMap::new()) }
    }

    /// Load a prompt, composing referenced globals into the system text.
    ///
    /// # Errors
    ///
    /// Returns [`AegisError::PromptNotFound`] when no record exists for
    /// (layer, name).
    pub async fn load_prompt(
        &self,
        layer: &str,
        name: &str,
        compose_with_globals: bool,
        ctx: &ExecutionContext,
    ) -> AegisResult<LoadedPrompt> {
        let record = self.fetch_cached(layer, name).await?;

        log_debug!(
            execution_id = %ctx.execution_id,
            layer = %layer,
            name = %name,
            version = %record.version,
            "Prompt loaded"
        );

        let tool_definition = record
            .tool_definition
            .as_ref()
            .map(|raw| normalize_tool_definition(layer, name, raw));

        let mut system_prompt = record.system_prompt.clone();
        if compose_with_globals && !record.uses_global.is_empty() {
            let today = Utc::now().date_naive();
            let mut blocks = Vec::with_capacity(record.uses_global.len() + 1);
            for id in &record.uses_global {
                match resolve_global(id, today) {
                    Some(text) => blocks.push(text),
                    None => {
                        log_warn!(
                            layer = %layer,
                            name = %name,
                            global_id = %id,
                            "Unknown global prompt id; skipping"
                        );
                    }
                }
            }
            blocks.push(system_prompt);
            system_prompt = blocks.join("\n\n");
        }

        Ok(LoadedPrompt {
            system_prompt,
            user_prompt: record.user_prompt.clone(),
            tool_definition,
        })
    }

    async fn fetch_cached(&self, layer: &str, name: &str) -> AegisResult<PromptRecord> {
        let key = (layer.to_string(), name.to_string());
        if let Some(record) = self.cache.read().await.get(&key) {
            return Ok(record.clone());
        }

        let record = self
            .store
            .fetch_latest(layer, name)
            .await?
            .ok_or_else(|| AegisError::prompt_not_found(layer, name))?;

        self.cache.write().await.insert(key, record.clone());
        Ok(record)
    }

    /// Drop the cache (test isolation).
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

/// Normalize a stored tool definition.
///
/// A definition that deserializes to a JSON *string* indicates a
/// double-encoded upload; the registry surfaces a warning and re-parses
/// the inner payload when it can, because callers fail downstream on a
/// string where an object is expected.
fn normalize_tool_definition(
    layer: &str,
    name: &str,
    raw: &serde_json::Value,
) -> serde_json::Value {
    let serde_json::Value::String(inner) = raw else {
        return raw.clone();
    };

    log_warn!(
        layer = %layer,
        name = %name,
        "Tool definition is double-encoded as a string; re-parsing"
    );

    match serde_json::from_str::<serde_json::Value>(inner.trim()) {
        Ok(parsed) => parsed,
        Err(_) => raw.clone(),
    }
}

/// Fill `{key}` placeholders in a template.
///
/// Unknown placeholders are left intact so template authors can stage new
/// variables without breaking existing prompts.
pub fn render_template(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in pairs {
        rendered = rendered.replace(&format!("{{{key}}}"), value);
    }
    rendered
}
