//! Unit test suites.
//!
//! Integration suites (streaming pipeline, ETL idempotence, OAuth retry)
//! live under `tests/`.

use crate::settings::{AuthMethod, LlmSettings, ModelTier, PostgresSettings, Settings};

/// Baseline settings fixture for suites that need one.
pub fn test_settings() -> Settings {
    Settings {
        auth_method: AuthMethod::ApiKey,
        api_key: Some("test-key".to_string()),
        oauth_endpoint: None,
        oauth_client_id: None,
        oauth_client_secret: None,
        oauth_max_retries: 3,
        oauth_retry_delay: 0.01,
        ssl_verify: false,
        ssl_cert_path: None,
        log_level: "debug".to_string(),
        llm: LlmSettings {
            base_url: "http://localhost:9".to_string(),
            small: ModelTier {
                model: "small-model".to_string(),
                cost_per_1k_input: 0.001,
                cost_per_1k_output: 0.002,
            },
            medium: ModelTier {
                model: "medium-model".to_string(),
                cost_per_1k_input: 0.005,
                cost_per_1k_output: 0.01,
            },
            large: ModelTier {
                model: "large-model".to_string(),
                cost_per_1k_input: 0.01,
                cost_per_1k_output: 0.03,
            },
            embedding_model: "embed-model".to_string(),
        },
        postgres: PostgresSettings {
            host: "localhost".to_string(),
            port: 5432,
            user: "aegis".to_string(),
            password: String::new(),
            database: "aegis".to_string(),
        },
        s3_bucket: "test-bucket".to_string(),
        max_history_length: 10,
        allowed_roles: vec!["user".to_string(), "assistant".to_string()],
        include_system_messages: false,
    }
}

use crate::auth::AuthConfig;
use crate::context::ExecutionContext;
use crate::ssl::SslConfig;

/// Execution-context fixture with a succeeded api-key credential.
pub fn test_context() -> ExecutionContext {
    let auth = AuthConfig {
        method: AuthMethod::ApiKey,
        token: Some("test-token".to_string()),
        success: true,
        error: None,
    };
    ExecutionContext::new(auth, SslConfig::insecure(), "aegis")
}

pub mod availability;
pub mod categories;
pub mod document;
pub mod gateway;
pub mod monitor;
pub mod prompts;
pub mod retrieval;
pub mod retry;
pub mod selection;
pub mod ssl_setup;
