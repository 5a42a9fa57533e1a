//! Object storage for rendered report documents.
//!
//! The backend is an external collaborator consumed through the narrow
//! [`ObjectStore`] trait. Document names are deterministic:
//! `reports/<bank_symbol>_<fiscal_year>_<quarter>_<8hex>.<ext>`, where the
//! 8-hex suffix is a content hash distinguishing regenerations.

use crate::error::{AegisError, AegisResult};
use crate::fiscal::Quarter;
use crate::logging::log_info;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Prefix for report objects.
pub const REPORTS_PREFIX: &str = "reports/";

/// Narrow interface to the object-storage backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` under `name` (already prefixed) and return the
    /// object URL.
    async fn upload(&self, name: &str, bytes: &[u8]) -> AegisResult<String>;
}

/// Build the deterministic object name for a rendered document.
///
/// The hash is the first 8 hex characters of the SHA-256 of the rendered
/// content, so the name changes only when the content does. Symbols are
/// sanitized for path safety (`RY-CA` becomes `RY`).
pub fn document_name(
    bank_symbol: &str,
    fiscal_year: i32,
    quarter: Quarter,
    content: &[u8],
    extension: &str,
) -> String {
    let digest = Sha256::digest(content);
    let short_hash = &hex::encode(digest)[..8];
    let symbol = bank_symbol.split('-').next().unwrap_or(bank_symbol);
    format!("{REPORTS_PREFIX}{symbol}_{fiscal_year}_{quarter}_{short_hash}.{extension}")
}

/// S3-backed object store.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build the store from ambient AWS configuration.
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.into(),
        }
    }

    /// Build the store from an existing client (tests, custom endpoints).
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into() }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> AegisResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(aws_sdk_s3::primitives::ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| {
                AegisError::upstream(
                    format!("Object upload failed for {name}: {e}"),
                    true,
                    Some(Box::new(e)),
                )
            })?;

        let url = format!("s3://{}/{}", self.bucket, name);
        log_info!(object = %name, bucket = %self.bucket, "Document uploaded");
        Ok(url)
    }
}
