//! Typed configuration loaded from the environment.
//!
//! All components read from a single frozen [`Settings`] value built once at
//! process start with [`Settings::from_env`]. Nothing re-reads the
//! environment after that point.
//!
//! # Recognized Variables
//!
//! | Variable | Default | Purpose |
//! |----------|---------|---------|
//! | `AUTH_METHOD` | `api_key` | `api_key` or `oauth` |
//! | `API_KEY` | (none) | bearer credential for `api_key` mode |
//! | `OAUTH_ENDPOINT` / `OAUTH_CLIENT_ID` / `OAUTH_CLIENT_SECRET` | (none) | client-credentials grant |
//! | `OAUTH_MAX_RETRIES` | `3` | bounded token-acquisition attempts |
//! | `OAUTH_RETRY_DELAY` | `1.0` | initial backoff in seconds |
//! | `SSL_VERIFY` | `true` | TLS verification toggle |
//! | `SSL_CERT_PATH` | (none) | custom trust root |
//! | `LOG_LEVEL` | `info` | tracing filter hint |
//! | `LLM_BASE_URL` | `https://api.openai.com` | OpenAI-compatible endpoint |
//! | `LLM_SMALL_MODEL` / `LLM_MEDIUM_MODEL` / `LLM_LARGE_MODEL` | gpt-4o-mini / gpt-4o / gpt-4-turbo | model tiers |
//! | `EMBEDDING_MODEL` | `text-embedding-3-large` | embedding endpoint model |
//! | `POSTGRES_HOST/PORT/USER/PASSWORD/DATABASE` | localhost/5432/… | relational store |
//! | `S3_BUCKET` | `aegis-reports` | report object storage |
//! | `MAX_HISTORY_LENGTH` | `10` | conversation truncation cap |
//! | `ALLOWED_ROLES` | `user,assistant` | conversation role allow-list |
//! | `INCLUDE_SYSTEM_MESSAGES` | `false` | keep system turns |
//!
//! Per-ETL overrides (`<ETL>_MODEL`, `<ETL>_TEMPERATURE`, `<ETL>_MAX_TOKENS`,
//! `<ETL>_MAX_CONCURRENT`) are resolved by the ETL config loader, not here.

use crate::error::{AegisError, AegisResult};
use crate::logging::log_debug;
use serde::{Deserialize, Serialize};
use std::env;

/// Credential acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    /// Static bearer token from `API_KEY`.
    ApiKey,
    /// OAuth client-credentials grant against `OAUTH_ENDPOINT`.
    OAuth,
}

impl AuthMethod {
    /// Wire name of the method (`api_key` / `oauth`).
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::ApiKey => "api_key",
            AuthMethod::OAuth => "oauth",
        }
    }
}

/// One model tier: a concrete model name plus its billing rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTier {
    /// Provider model identifier.
    pub model: String,
    /// Cost per 1000 prompt tokens, in dollars.
    pub cost_per_1k_input: f64,
    /// Cost per 1000 completion tokens, in dollars.
    pub cost_per_1k_output: f64,
}

/// LLM endpoint configuration with the small/medium/large tier table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// Cheap tier for routing/classification calls.
    pub small: ModelTier,
    /// Default tier for extraction and synthesis.
    pub medium: ModelTier,
    /// Large tier for formatting and long-context calls.
    pub large: ModelTier,
    /// Embedding model name.
    pub embedding_model: String,
}

impl LlmSettings {
    /// Resolve a tier reference (`small` / `medium` / `large`) to its tier.
    ///
    /// A string that is not a tier reference is treated as a concrete model
    /// name with medium-tier rates.
    pub fn resolve_tier(&self, reference: &str) -> ModelTier {
        match reference {
            "small" => self.small.clone(),
            "medium" => self.medium.clone(),
            "large" => self.large.clone(),
            other => ModelTier {
                model: other.to_string(),
                cost_per_1k_input: self.medium.cost_per_1k_input,
                cost_per_1k_output: self.medium.cost_per_1k_output,
            },
        }
    }

    /// Billing rates for a concrete model name, if it matches a tier.
    pub fn rates_for_model(&self, model: &str) -> Option<(f64, f64)> {
        [&self.small, &self.medium, &self.large]
            .into_iter()
            .find(|t| t.model == model)
            .map(|t| (t.cost_per_1k_input, t.cost_per_1k_output))
    }
}

/// Relational store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSettings {
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Role name.
    pub user: String,
    /// Role password.
    pub password: String,
    /// Database name.
    pub database: String,
}

impl PostgresSettings {
    /// Connection string in libpq keyword form.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, self.database
        )
    }
}

/// Frozen process-wide configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Credential acquisition mode.
    pub auth_method: AuthMethod,
    /// Static bearer token (api_key mode).
    pub api_key: Option<String>,
    /// OAuth token endpoint (oauth mode).
    pub oauth_endpoint: Option<String>,
    /// OAuth client id.
    pub oauth_client_id: Option<String>,
    /// OAuth client secret.
    pub oauth_client_secret: Option<String>,
    /// Bounded OAuth attempts.
    pub oauth_max_retries: u32,
    /// Initial OAuth backoff in seconds.
    pub oauth_retry_delay: f64,
    /// TLS verification toggle.
    pub ssl_verify: bool,
    /// Custom trust root path.
    pub ssl_cert_path: Option<String>,
    /// Tracing filter hint.
    pub log_level: String,
    /// LLM endpoint and tiers.
    pub llm: LlmSettings,
    /// Relational store.
    pub postgres: PostgresSettings,
    /// Object-store bucket for rendered reports.
    pub s3_bucket: String,
    /// Conversation truncation cap.
    pub max_history_length: usize,
    /// Conversation role allow-list.
    pub allowed_roles: Vec<String>,
    /// Whether system turns survive filtering.
    pub include_system_messages: bool,
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`AegisError::Config`] if:
    /// - `AUTH_METHOD` is set to an unrecognized value
    /// - `api_key` mode is selected without `API_KEY`
    /// - `oauth` mode is selected without endpoint/id/secret
    /// - a numeric variable fails to parse
    pub fn from_env() -> AegisResult<Self> {
        let auth_method = match env_or("AUTH_METHOD", "api_key").as_str() {
            "api_key" => AuthMethod::ApiKey,
            "oauth" => AuthMethod::OAuth,
            other => {
                return Err(AegisError::config(format!(
                    "AUTH_METHOD must be api_key or oauth, got {other}"
                )))
            }
        };

        let api_key = env::var("API_KEY").ok().filter(|v| !v.is_empty());
        let oauth_endpoint = env::var("OAUTH_ENDPOINT").ok().filter(|v| !v.is_empty());
        let oauth_client_id = env::var("OAUTH_CLIENT_ID").ok().filter(|v| !v.is_empty());
        let oauth_client_secret = env::var("OAUTH_CLIENT_SECRET").ok().filter(|v| !v.is_empty());

        match auth_method {
            AuthMethod::ApiKey if api_key.is_none() => {
                return Err(AegisError::config("AUTH_METHOD=api_key requires API_KEY"));
            }
            AuthMethod::OAuth
                if oauth_endpoint.is_none()
                    || oauth_client_id.is_none()
                    || oauth_client_secret.is_none() =>
            {
                return Err(AegisError::config(
                    "AUTH_METHOD=oauth requires OAUTH_ENDPOINT, OAUTH_CLIENT_ID and OAUTH_CLIENT_SECRET",
                ));
            }
            _ => {}
        }

        let settings = Self {
            auth_method,
            api_key,
            oauth_endpoint,
            oauth_client_id,
            oauth_client_secret,
            oauth_max_retries: parse_env("OAUTH_MAX_RETRIES", 3)?,
            oauth_retry_delay: parse_env("OAUTH_RETRY_DELAY", 1.0)?,
            ssl_verify: parse_env("SSL_VERIFY", true)?,
            ssl_cert_path: env::var("SSL_CERT_PATH").ok().filter(|v| !v.is_empty()),
            log_level: env_or("LOG_LEVEL", "info"),
            llm: LlmSettings {
                base_url: env_or("LLM_BASE_URL", "https://api.openai.com"),
                small: ModelTier {
                    model: env_or("LLM_SMALL_MODEL", "gpt-4o-mini"),
                    cost_per_1k_input: parse_env("LLM_SMALL_COST_INPUT", 0.000_15)?,
                    cost_per_1k_output: parse_env("LLM_SMALL_COST_OUTPUT", 0.000_6)?,
                },
                medium: ModelTier {
                    model: env_or("LLM_MEDIUM_MODEL", "gpt-4o"),
                    cost_per_1k_input: parse_env("LLM_MEDIUM_COST_INPUT", 0.002_5)?,
                    cost_per_1k_output: parse_env("LLM_MEDIUM_COST_OUTPUT", 0.01)?,
                },
                large: ModelTier {
                    model: env_or("LLM_LARGE_MODEL", "gpt-4-turbo"),
                    cost_per_1k_input: parse_env("LLM_LARGE_COST_INPUT", 0.01)?,
                    cost_per_1k_output: parse_env("LLM_LARGE_COST_OUTPUT", 0.03)?,
                },
                embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-large"),
            },
            postgres: PostgresSettings {
                host: env_or("POSTGRES_HOST", "localhost"),
                port: parse_env("POSTGRES_PORT", 5432)?,
                user: env_or("POSTGRES_USER", "aegis"),
                password: env_or("POSTGRES_PASSWORD", ""),
                database: env_or("POSTGRES_DATABASE", "aegis"),
            },
            s3_bucket: env_or("S3_BUCKET", "aegis-reports"),
            max_history_length: parse_env("MAX_HISTORY_LENGTH", 10)?,
            allowed_roles: env_or("ALLOWED_ROLES", "user,assistant")
                .split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            include_system_messages: parse_env("INCLUDE_SYSTEM_MESSAGES", false)?,
        };

        log_debug!(
            auth_method = settings.auth_method.as_str(),
            ssl_verify = settings.ssl_verify,
            llm_base_url = %settings.llm.base_url,
            "Settings loaded from environment"
        );

        Ok(settings)
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(name: &str, default: T) -> AegisResult<T>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| AegisError::config(format!("{name} has invalid value: {raw}"))),
        _ => Ok(default),
    }
}
