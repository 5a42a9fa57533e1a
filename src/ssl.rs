//! SSL trust configuration.
//!
//! Resolves TLS verification behavior from settings once per process. The
//! resulting [`SslConfig`] is threaded through the execution context and
//! consumed by every HTTP client builder.

use crate::error::{AegisError, AegisResult};
use crate::logging::{log_debug, log_info};
use crate::settings::Settings;
use std::path::{Path, PathBuf};

/// Resolved TLS trust configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslConfig {
    /// Whether certificate verification is enabled.
    pub verify: bool,
    /// Custom trust-root path, when one is configured and exists.
    pub cert_path: Option<PathBuf>,
}

impl SslConfig {
    /// Verification disabled (local development).
    pub fn insecure() -> Self {
        Self { verify: false, cert_path: None }
    }

    /// Verification against the system trust store.
    pub fn system() -> Self {
        Self { verify: true, cert_path: None }
    }

    /// Build a reqwest client honoring this trust configuration.
    ///
    /// A configured cert file is added as an extra trust root; an
    /// unreadable file at this point is a fatal [`AegisError::Config`]
    /// (the path was validated at startup, so this only fires if the file
    /// disappeared since).
    pub fn build_client(&self) -> AegisResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder();

        if !self.verify {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(path) = &self.cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                AegisError::config(format!("Failed to read SSL certificate {}: {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                AegisError::config(format!("Invalid SSL certificate {}: {e}", path.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| AegisError::config(format!("Failed to build HTTP client: {e}")))
    }
}

/// Resolve SSL configuration from settings.
///
/// With `SSL_VERIFY=false` verification is disabled. With verification
/// enabled and a cert path configured, the file must exist (a `~/` prefix
/// is expanded against `HOME`); a missing file is a fatal
/// [`AegisError::Config`]. With no path configured, the system trust store
/// is used.
pub fn setup_ssl(settings: &Settings) -> AegisResult<SslConfig> {
    if !settings.ssl_verify {
        log_debug!("SSL verification disabled");
        return Ok(SslConfig::insecure());
    }

    let Some(raw_path) = settings.ssl_cert_path.as_deref() else {
        log_info!("SSL verification enabled with system certificates");
        return Ok(SslConfig::system());
    };

    let cert_path = expand_user(raw_path);
    if !cert_path.exists() {
        return Err(AegisError::config(format!(
            "SSL certificate file not found: {}",
            cert_path.display()
        )));
    }

    log_info!(cert_path = %cert_path.display(), "SSL verification enabled with certificate");
    Ok(SslConfig { verify: true, cert_path: Some(cert_path) })
}

fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(path)
}
