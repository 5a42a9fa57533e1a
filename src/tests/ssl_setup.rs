//! SSL bootstrap tests.

use super::test_settings;
use crate::error::AegisError;
use crate::ssl::setup_ssl;
use std::io::Write;

#[test]
fn disabled_verification_returns_insecure_config() {
    let mut settings = test_settings();
    settings.ssl_verify = false;
    settings.ssl_cert_path = Some("/nonexistent/cert.pem".to_string());

    let ssl = setup_ssl(&settings).expect("insecure config");
    assert!(!ssl.verify);
    assert!(ssl.cert_path.is_none());
}

#[test]
fn verification_without_path_uses_system_store() {
    let mut settings = test_settings();
    settings.ssl_verify = true;
    settings.ssl_cert_path = None;

    let ssl = setup_ssl(&settings).expect("system trust");
    assert!(ssl.verify);
    assert!(ssl.cert_path.is_none());
}

#[test]
fn missing_cert_file_is_fatal() {
    let mut settings = test_settings();
    settings.ssl_verify = true;
    settings.ssl_cert_path = Some("/definitely/not/here.cer".to_string());

    let err = setup_ssl(&settings).unwrap_err();
    assert!(matches!(err, AegisError::Config { .. }));
    assert!(err.to_string().contains("not found"));
}

#[test]
fn existing_cert_file_is_resolved() {
    let mut cert = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(cert, "-----BEGIN CERTIFICATE-----").expect("write");

    let mut settings = test_settings();
    settings.ssl_verify = true;
    settings.ssl_cert_path = Some(cert.path().display().to_string());

    let ssl = setup_ssl(&settings).expect("resolves");
    assert!(ssl.verify);
    assert_eq!(ssl.cert_path.as_deref(), Some(cert.path()));
}
