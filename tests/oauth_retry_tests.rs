//! OAuth client-credentials tests against a mock HTTP endpoint.

mod common;

use aegis::ssl::SslConfig;
use aegis::{setup_authentication, AuthMethod};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};
use std::sync::atomic::{AtomicU32, Ordering};

fn oauth_settings(endpoint: String) -> aegis::Settings {
    let mut settings = common::test_settings();
    settings.auth_method = AuthMethod::OAuth;
    settings.api_key = None;
    settings.oauth_endpoint = Some(endpoint);
    settings.oauth_client_id = Some("test-client".to_string());
    settings.oauth_client_secret = Some("test-secret".to_string());
    settings.oauth_max_retries = 3;
    settings.oauth_retry_delay = 0.01;
    settings
}

/// Fails twice, then returns a token.
struct FlakyTokenEndpoint {
    calls: AtomicU32,
}

impl Respond for FlakyTokenEndpoint {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < 3 {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "token-after-retries",
                "token_type": "Bearer"
            }))
        }
    }
}

#[tokio::test]
async fn oauth_succeeds_first_try() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = oauth_settings(format!("{}/oauth/token", server.uri()));
    let auth = setup_authentication("exec-1", &SslConfig::insecure(), &settings)
        .await
        .expect("local setup succeeds");

    assert!(auth.success);
    assert_eq!(auth.token.as_deref(), Some("fresh-token"));
    assert_eq!(auth.bearer_header().as_deref(), Some("Bearer fresh-token"));
}

#[tokio::test]
async fn oauth_retries_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(FlakyTokenEndpoint { calls: AtomicU32::new(0) })
        .expect(3)
        .mount(&server)
        .await;

    let settings = oauth_settings(format!("{}/oauth/token", server.uri()));
    let auth = setup_authentication("exec-2", &SslConfig::insecure(), &settings)
        .await
        .expect("local setup succeeds");

    assert!(auth.success);
    assert_eq!(auth.token.as_deref(), Some("token-after-retries"));
}

#[tokio::test]
async fn oauth_exhausted_retries_returns_failure_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let settings = oauth_settings(format!("{}/oauth/token", server.uri()));
    let auth = setup_authentication("exec-3", &SslConfig::insecure(), &settings)
        .await
        .expect("failure is a record, not an Err");

    assert!(!auth.success);
    assert!(auth.token.is_none());
    assert!(auth.bearer_header().is_none());
    let error = auth.error.expect("failure carries a reason");
    assert!(error.contains("3 attempts"), "got: {error}");
}

#[tokio::test]
async fn token_response_without_access_token_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let settings = oauth_settings(format!("{}/oauth/token", server.uri()));
    let auth = setup_authentication("exec-4", &SslConfig::insecure(), &settings)
        .await
        .expect("failure is a record");

    assert!(!auth.success);
    assert!(auth.error.expect("reason").contains("access_token"));
}

#[tokio::test]
async fn api_key_mode_short_circuits() {
    let settings = common::test_settings();
    let auth = setup_authentication("exec-5", &SslConfig::insecure(), &settings)
        .await
        .expect("api key mode succeeds");
    assert!(auth.success);
    assert_eq!(auth.bearer_header().as_deref(), Some("Bearer test-key"));
}
