//! Per-ETL configuration.
//!
//! Each ETL resolves a small YAML config mapping task names to model tier
//! references ({small, medium, large}) or concrete model names, plus
//! temperature, token, concurrency, and retry knobs. Environment variables
//! override the YAML: `<ETL>_MODEL` (all tasks), `<ETL>_MODEL_<TASK>`
//! (one task), `<ETL>_TEMPERATURE`, `<ETL>_MAX_TOKENS`,
//! `<ETL>_MAX_CONCURRENT`.
//!
//! Unknown YAML keys warn rather than fail, preserving template authoring
//! freedom.

use crate::error::{AegisError, AegisResult};
use crate::logging::{log_debug, log_warn};
use crate::settings::{ModelTier, Settings};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Default per-bank concurrency for ETL fan-out.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Resolved configuration for one ETL.
#[derive(Debug, Clone)]
pub struct EtlConfig {
    /// Environment prefix, e.g. `CALL_SUMMARY`.
    pub etl_name: String,
    /// Task name to resolved model tier.
    models: HashMap<String, ModelTier>,
    /// Default tier for tasks with no explicit mapping.
    default_model: ModelTier,
    /// Sampling temperature for extraction calls.
    pub temperature: f64,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Bounded per-bank concurrency.
    pub max_concurrent: usize,
    /// Bounded extraction retries per category.
    pub max_retries: u32,
}

impl EtlConfig {
    /// Load from a YAML file, or fall back to defaults when no path is
    /// given.
    pub fn load(
        etl_name: &str,
        yaml_path: Option<&Path>,
        settings: &Settings,
    ) -> AegisResult<Self> {
        let yaml = match yaml_path {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                AegisError::config(format!(
                    "ETL config not readable: {} ({e})",
                    path.display()
                ))
            })?),
            None => None,
        };
        Self::from_yaml(etl_name, yaml.as_deref(), settings)
    }

    /// Build from YAML text (or defaults when `None`), applying env
    /// overrides last.
    pub fn from_yaml(
        etl_name: &str,
        yaml: Option<&str>,
        settings: &Settings,
    ) -> AegisResult<Self> {
        let mut models: HashMap<String, ModelTier> = HashMap::new();
        let mut temperature = 0.3;
        let mut max_tokens = 8192;
        let mut max_concurrent = DEFAULT_MAX_CONCURRENT;
        let mut max_retries = 2;

        if let Some(yaml) = yaml {
            let parsed: serde_yaml::Value = serde_yaml::from_str(yaml)
                .map_err(|e| AegisError::config(format!("Invalid ETL config YAML: {e}")))?;
            let Some(mapping) = parsed.as_mapping() else {
                return Err(AegisError::config("ETL config YAML must be a mapping"));
            };

            for (key, value) in mapping {
                match key.as_str() {
                    Some("models") => {
                        let Some(model_map) = value.as_mapping() else {
                            return Err(AegisError::config("ETL config `models` must be a mapping"));
                        };
                        for (task, reference) in model_map {
                            let (Some(task), Some(reference)) = (task.as_str(), reference.as_str())
                            else {
                                return Err(AegisError::config(
                                    "ETL config model entries must be strings",
                                ));
                            };
                            models.insert(task.to_string(), settings.llm.resolve_tier(reference));
                        }
                    }
                    Some("temperature") => {
                        temperature = value.as_f64().ok_or_else(|| {
                            AegisError::config("ETL config `temperature` must be a number")
                        })?;
                    }
                    Some("max_tokens") => {
                        max_tokens = value.as_u64().ok_or_else(|| {
                            AegisError::config("ETL config `max_tokens` must be an integer")
                        })? as u32;
                    }
                    Some("max_concurrent") => {
                        max_concurrent = value.as_u64().ok_or_else(|| {
                            AegisError::config("ETL config `max_concurrent` must be an integer")
                        })? as usize;
                    }
                    Some("max_retries") => {
                        max_retries = value.as_u64().ok_or_else(|| {
                            AegisError::config("ETL config `max_retries` must be an integer")
                        })? as u32;
                    }
                    Some(other) => {
                        log_warn!(etl = %etl_name, key = %other, "Unknown ETL config key; ignoring");
                    }
                    None => {
                        log_warn!(etl = %etl_name, "Non-string ETL config key; ignoring");
                    }
                }
            }
        }

        let mut config = Self {
            etl_name: etl_name.to_string(),
            models,
            default_model: settings.llm.medium.clone(),
            temperature,
            max_tokens,
            max_concurrent: max_concurrent.max(1),
            max_retries,
        };
        config.apply_env_overrides(settings)?;

        log_debug!(
            etl = %etl_name,
            temperature = config.temperature,
            max_tokens = config.max_tokens,
            max_concurrent = config.max_concurrent,
            "ETL config resolved"
        );
        Ok(config)
    }

    fn apply_env_overrides(&mut self, settings: &Settings) -> AegisResult<()> {
        let prefix = self.etl_name.to_uppercase();

        if let Some(model) = read_env(&format!("{prefix}_MODEL")) {
            self.default_model = settings.llm.resolve_tier(&model);
            for tier in self.models.values_mut() {
                *tier = settings.llm.resolve_tier(&model);
            }
        }

        // Per-task override: <ETL>_MODEL_<TASK>.
        let tasks: Vec<String> = self.models.keys().cloned().collect();
        for task in tasks {
            let var = format!("{prefix}_MODEL_{}", task.to_uppercase());
            if let Some(model) = read_env(&var) {
                self.models.insert(task, settings.llm.resolve_tier(&model));
            }
        }

        if let Some(raw) = read_env(&format!("{prefix}_TEMPERATURE")) {
            self.temperature = raw.parse().map_err(|_| {
                AegisError::config(format!("{prefix}_TEMPERATURE has invalid value: {raw}"))
            })?;
        }
        if let Some(raw) = read_env(&format!("{prefix}_MAX_TOKENS")) {
            self.max_tokens = raw.parse().map_err(|_| {
                AegisError::config(format!("{prefix}_MAX_TOKENS has invalid value: {raw}"))
            })?;
        }
        if let Some(raw) = read_env(&format!("{prefix}_MAX_CONCURRENT")) {
            self.max_concurrent = raw
                .parse::<usize>()
                .map_err(|_| {
                    AegisError::config(format!(
                        "{prefix}_MAX_CONCURRENT has invalid value: {raw}"
                    ))
                })?
                .max(1);
        }
        Ok(())
    }

    /// Model name for one task.
    pub fn get_model(&self, task: &str) -> String {
        self.models
            .get(task)
            .unwrap_or(&self.default_model)
            .model
            .clone()
    }

    /// Completion token cap for one task.
    ///
    /// Currently uniform across tasks; kept per-task so a template can
    /// grow a task-specific cap without changing call sites.
    pub fn get_max_tokens(&self, _task: &str) -> u32 {
        self.max_tokens
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
