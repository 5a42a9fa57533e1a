//! Bearer credential acquisition.
//!
//! Two modes, selected by `AUTH_METHOD`:
//!
//! - `api_key`: the static `API_KEY` value becomes the bearer token.
//! - `oauth`: a client-credentials grant is POSTed to the configured
//!   endpoint with bounded retries and exponential backoff.
//!
//! [`setup_authentication`] never panics and never returns `Err` for an
//! acquisition failure; it returns an [`AuthConfig`] with `success=false`
//! and a human-readable error. Downstream components must treat
//! `success=false` as fatal for their operation.

use crate::error::AegisResult;
use crate::logging::{log_error, log_info, log_warn};
use crate::settings::{AuthMethod, Settings};
use crate::ssl::SslConfig;
use serde::Deserialize;
use std::time::Duration;

/// Resolved authentication state for one execution.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// The mode that produced this credential.
    pub method: AuthMethod,
    /// Bearer token, when acquisition succeeded.
    pub token: Option<String>,
    /// Whether acquisition succeeded.
    pub success: bool,
    /// Human-readable failure description.
    pub error: Option<String>,
}

impl AuthConfig {
    /// Ready-to-use `Authorization` header value.
    pub fn bearer_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    fn succeeded(method: AuthMethod, token: String) -> Self {
        Self { method, token: Some(token), success: true, error: None }
    }

    fn failed(method: AuthMethod, error: impl Into<String>) -> Self {
        Self { method, token: None, success: false, error: Some(error.into()) }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Acquire the bearer credential for one execution.
///
/// # Errors
///
/// Returns `Err` only for local setup problems (an HTTP client that cannot
/// be built from the SSL config). Remote acquisition failures come back as
/// an [`AuthConfig`] with `success=false`.
pub async fn setup_authentication(
    execution_id: &str,
    ssl: &SslConfig,
    settings: &Settings,
) -> AegisResult<AuthConfig> {
    match settings.auth_method {
        AuthMethod::ApiKey => match settings.api_key.as_deref() {
            Some(key) => {
                log_info!(execution_id = %execution_id, method = "api_key", "Authentication ready");
                Ok(AuthConfig::succeeded(AuthMethod::ApiKey, key.to_string()))
            }
            None => Ok(AuthConfig::failed(AuthMethod::ApiKey, "API_KEY is not configured")),
        },
        AuthMethod::OAuth => oauth_client_credentials(execution_id, ssl, settings).await,
    }
}

/// Run the client-credentials grant with bounded retries.
async fn oauth_client_credentials(
    execution_id: &str,
    ssl: &SslConfig,
    settings: &Settings,
) -> AegisResult<AuthConfig> {
    let endpoint = settings.oauth_endpoint.as_deref().unwrap_or_default();
    let client_id = settings.oauth_client_id.as_deref().unwrap_or_default();
    let client_secret = settings.oauth_client_secret.as_deref().unwrap_or_default();

    let client = ssl.build_client()?;
    let mut last_error = String::from("No attempts made");

    for attempt in 1..=settings.oauth_max_retries.max(1) {
        match fetch_token(&client, endpoint, client_id, client_secret).await {
            Ok(token) => {
                log_info!(
                    execution_id = %execution_id,
                    method = "oauth",
                    attempt = attempt,
                    "OAuth token acquired"
                );
                return Ok(AuthConfig::succeeded(AuthMethod::OAuth, token));
            }
            Err(e) => {
                last_error = e;
                log_warn!(
                    execution_id = %execution_id,
                    attempt = attempt,
                    max_attempts = settings.oauth_max_retries,
                    error = %last_error,
                    "OAuth token acquisition failed"
                );
                if attempt < settings.oauth_max_retries {
                    let delay = settings.oauth_retry_delay * 2f64.powi(attempt as i32 - 1);
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                }
            }
        }
    }

    log_error!(
        execution_id = %execution_id,
        attempts = settings.oauth_max_retries,
        error = %last_error,
        "OAuth authentication exhausted retries"
    );
    Ok(AuthConfig::failed(
        AuthMethod::OAuth,
        format!("OAuth failed after {} attempts: {last_error}", settings.oauth_max_retries),
    ))
}

async fn fetch_token(
    client: &reqwest::Client,
    endpoint: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, String> {
    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];

    let response = client
        .post(endpoint)
        .form(&params)
        .send()
        .await
        .map_err(|e| format!("transport error: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("token endpoint returned {status}"));
    }

    let body: TokenResponse =
        response.json().await.map_err(|e| format!("invalid token response: {e}"))?;

    body.access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "token response missing access_token".to_string())
}
