use crate::adapters::storage::{ObjectStorage, StorageError, encode_path};
use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::time::Duration;

/// Bucket access through the AWS SDK. Credentials come from the ambient
/// provider chain unless static keys are configured.
#[derive(Clone, Debug)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_prefix: String,
}

impl S3Storage {
    #[must_use]
    pub fn new(client: Client, bucket: String, public_prefix: String) -> Self {
        Self { client, bucket, public_prefix: public_prefix.trim_end_matches('/').to_string() }
    }

    pub async fn from_config(config: &StorageConfig, bucket: String) -> Self {
        let region = aws_config::Region::new(config.region.clone());
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);
        let client = Client::from_conf(s3_config.build());

        let prefix = public_prefix(config, &bucket);
        Self::new(client, bucket, prefix)
    }
}

/// Base URL that object keys are appended to for public reads.
fn public_prefix(config: &StorageConfig, bucket: &str) -> String {
    match config.public_base_url.as_ref().or(config.endpoint.as_ref()) {
        Some(base) => format!("{}/{bucket}", base.trim_end_matches('/')),
        None => format!("https://{bucket}.s3.{}.amazonaws.com", config.region),
    }
}

fn sdk_error<E>(err: &SdkError<E, HttpResponse>, operation: &str) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(err).to_string();
    tracing::error!(error = %detail, operation, "S3 request failed");

    match err.raw_response() {
        Some(response) => StorageError::Rejected { status: response.status().as_u16(), body: detail },
        None => StorageError::Transport(detail),
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(bucket = %self.bucket, size = body.len()))]
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error(&e, "upload"))?;

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_prefix, encode_path(key))
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::Signing(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Signing(DisplayErrorContext(&e).to_string()))?;

        Ok(request.uri().to_string())
    }

    async fn check(&self) -> Result<(), StorageError> {
        self.client.head_bucket().bucket(&self.bucket).send().await.map_err(|e| sdk_error(&e, "check"))?;
        Ok(())
    }
}
