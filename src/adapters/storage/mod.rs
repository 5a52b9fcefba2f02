use crate::config::{StorageAuth, StorageConfig, UrlMode};
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod gcs;
pub mod oauth;
pub mod s3;

pub use gcs::{GcsStorage, UrlSigner};
pub use oauth::{ServiceAccountTokenProvider, StaticTokenProvider, TokenProvider};
pub use s3::S3Storage;

/// Characters left untouched in object paths.
pub(crate) const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'/').remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Failure talking to the bucket. `Display` never includes upstream bodies.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("storage service rejected the request (status {status})")]
    Rejected { status: u16, body: String },
    #[error("storage service unreachable: {0}")]
    Transport(String),
    #[error("could not sign URL: {0}")]
    Signing(String),
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug + 'static {
    fn bucket(&self) -> &str;

    /// Transfers the whole object in one request. No retries.
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<(), StorageError>;

    /// Deterministic location of a publicly readable object.
    fn public_url(&self, key: &str) -> String;

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;

    /// Verifies the bucket is reachable with the configured credentials.
    async fn check(&self) -> Result<(), StorageError>;
}

pub(crate) fn encode_path(key: &str) -> String {
    utf8_percent_encode(key, PATH_SET).to_string()
}

/// Builds the storage backend selected by the authorization strategy.
/// `request_timeout` bounds every call to the storage service.
///
/// # Errors
/// Returns an error if required credentials are missing or malformed.
pub async fn from_config(config: &StorageConfig, request_timeout: Duration) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    let bucket = config.bucket_name().ok_or_else(|| anyhow::anyhow!("storage bucket or project id must be set"))?;

    match config.auth {
        StorageAuth::JwtExchange => {
            let http = reqwest::Client::builder().timeout(request_timeout).build()?;

            let tokens: Arc<dyn TokenProvider> = if let Some(token) = &config.static_token {
                tracing::warn!("Using a static storage token; token exchange is disabled");
                Arc::new(StaticTokenProvider::new(token.clone()))
            } else {
                let client_email =
                    config.client_email.clone().ok_or_else(|| anyhow::anyhow!("client email must be set"))?;
                let private_key = config.private_key_pem().ok_or_else(|| anyhow::anyhow!("private key must be set"))?;
                Arc::new(ServiceAccountTokenProvider::new(
                    http.clone(),
                    client_email,
                    &private_key,
                    config.token_uri.clone(),
                    config.scope.clone(),
                )?)
            };

            let public_base = config.public_base_url.clone().unwrap_or_else(|| config.api_base_url.clone());
            let mut storage = GcsStorage::new(http, tokens, bucket, config.api_base_url.clone(), public_base.clone());

            // Public links need no signing key.
            if config.url_mode == UrlMode::Signed {
                let (Some(email), Some(key)) = (&config.client_email, config.private_key_pem()) else {
                    anyhow::bail!("client email and private key must be set for signed URLs");
                };
                let mut signer = UrlSigner::new(email.clone(), &key)?;
                if let Some(host) = reqwest::Url::parse(&public_base).ok().and_then(|u| u.host_str().map(String::from)) {
                    signer = signer.with_host(host);
                }
                storage = storage.with_signer(signer);
            }

            tracing::info!(bucket = %storage.bucket(), "GCS storage initialized");
            Ok(Arc::new(storage))
        }
        StorageAuth::AmbientCredential => {
            let storage = S3Storage::from_config(config, bucket).await;
            tracing::info!(bucket = %storage.bucket(), "S3 storage initialized");
            Ok(Arc::new(storage))
        }
    }
}
