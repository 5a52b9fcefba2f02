use crate::adapters::storage::ObjectStorage;
use crate::config::{KeyScheme, StorageConfig, UrlMode};
use crate::domain::upload::{IncomingFile, ObjectKey, ObjectLocation, UploadedObject};
use crate::error::{AppError, Result};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Longest lifetime either backend accepts for a signed URL.
pub const MAX_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Debug)]
struct Metrics {
    uploads_total: Counter<u64>,
    upload_size_bytes: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("amora-server");
        Self {
            uploads_total: meter.u64_counter("uploads_total").with_description("Total upload attempts").build(),
            upload_size_bytes: meter
                .u64_histogram("upload_size_bytes")
                .with_description("Distribution of uploaded file sizes")
                .build(),
        }
    }
}

/// Forwards browser uploads to the configured bucket and resolves a URL for them.
#[derive(Clone, Debug)]
pub struct UploadGateway {
    storage: Arc<dyn ObjectStorage>,
    key_prefix: String,
    key_scheme: KeyScheme,
    url_mode: UrlMode,
    signed_url_expiry: Duration,
    max_upload_bytes: usize,
    metrics: Metrics,
}

impl UploadGateway {
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorage>, config: &StorageConfig) -> Self {
        let signed_url_expiry = Duration::from_secs(config.signed_url_expiry_secs).min(MAX_SIGNED_URL_EXPIRY);
        if signed_url_expiry.as_secs() < config.signed_url_expiry_secs {
            tracing::warn!(
                requested = config.signed_url_expiry_secs,
                applied = signed_url_expiry.as_secs(),
                "Signed URL expiry capped"
            );
        }

        Self {
            storage,
            key_prefix: config.key_prefix.clone(),
            key_scheme: config.key_scheme,
            url_mode: config.url_mode,
            signed_url_expiry,
            max_upload_bytes: config.max_upload_bytes,
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub const fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Stores the file under a fresh key and returns where it can be fetched.
    ///
    /// # Errors
    /// Returns `AppError::PayloadTooLarge` above the size limit.
    /// Returns `AppError::Upstream` if the bucket rejects the write or no URL can be produced.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, file),
        fields(bucket = %self.storage.bucket(), size = file.bytes.len(), key = tracing::field::Empty)
    )]
    pub async fn upload(&self, file: IncomingFile) -> Result<UploadedObject> {
        let size = file.bytes.len();
        if size > self.max_upload_bytes {
            self.record("too_large");
            return Err(AppError::PayloadTooLarge);
        }

        let key = ObjectKey::generate(&self.key_prefix, self.key_scheme, file.file_name.as_deref());
        tracing::Span::current().record("key", tracing::field::display(&key));
        let content_type = file.content_type().to_string();

        if let Err(e) = self.storage.put(key.as_str(), &content_type, file.bytes).await {
            self.record("error");
            return Err(e.into());
        }

        let location = match self.url_mode {
            UrlMode::Public => ObjectLocation::Public(self.storage.public_url(key.as_str())),
            UrlMode::Signed => {
                let url = self.storage.signed_url(key.as_str(), self.signed_url_expiry).await.inspect_err(|_| {
                    self.record("error");
                })?;
                ObjectLocation::Signed { url, expires_at: OffsetDateTime::now_utc() + self.signed_url_expiry }
            }
        };

        self.record("success");
        self.metrics.upload_size_bytes.record(u64::try_from(size).unwrap_or(u64::MAX), &[]);
        tracing::info!(key = %key, size, "File uploaded");

        Ok(UploadedObject { key, content_type, size, location })
    }

    fn record(&self, outcome: &'static str) {
        self.metrics.uploads_total.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}
