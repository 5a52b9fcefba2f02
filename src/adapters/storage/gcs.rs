use crate::adapters::storage::oauth::TokenProvider;
use crate::adapters::storage::{ObjectStorage, StorageError, encode_path};
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;

const SIGNING_ALGORITHM: &str = "GOOG4-RSA-SHA256";
const DEFAULT_SIGNING_HOST: &str = "storage.googleapis.com";

/// Produces V4 signed read URLs with a service-account key.
pub struct UrlSigner {
    client_email: String,
    private_key: RsaPrivateKey,
    host: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("client_email", &self.client_email)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    /// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM.
    ///
    /// # Errors
    /// Returns `StorageError::Signing` if the key is neither.
    pub fn new(client_email: String, private_key_pem: &str) -> Result<Self, StorageError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
            .map_err(|e| StorageError::Signing(format!("invalid service account key: {e}")))?;

        Ok(Self { client_email, private_key, host: DEFAULT_SIGNING_HOST.to_string() })
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Signs a GET for `bucket/key`, valid for `expires_in` from `now`.
    ///
    /// # Errors
    /// Returns `StorageError::Signing` if the timestamp cannot be formatted.
    pub fn sign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        now: OffsetDateTime,
    ) -> Result<String, StorageError> {
        let datestamp = now
            .format(format_description!("[year][month][day]"))
            .map_err(|e| StorageError::Signing(e.to_string()))?;
        let timestamp = now
            .format(format_description!("[year][month][day]T[hour][minute][second]Z"))
            .map_err(|e| StorageError::Signing(e.to_string()))?;

        let credential_scope = format!("{datestamp}/auto/storage/goog4_request");
        let credential = format!("{}/{credential_scope}", self.client_email);
        let canonical_uri = format!("/{bucket}/{}", encode_path(key));
        let signed_headers = "host";

        // Already sorted by name.
        let canonical_query = [
            ("X-Goog-Algorithm", SIGNING_ALGORITHM.to_string()),
            ("X-Goog-Credential", utf8_percent_encode(&credential, NON_ALPHANUMERIC).to_string()),
            ("X-Goog-Date", timestamp.clone()),
            ("X-Goog-Expires", expires_in.as_secs().to_string()),
            ("X-Goog-SignedHeaders", signed_headers.to_string()),
        ]
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

        let canonical_request = format!(
            "GET\n{canonical_uri}\n{canonical_query}\nhost:{}\n\n{signed_headers}\nUNSIGNED-PAYLOAD",
            self.host
        );
        let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!("{SIGNING_ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_hash}");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = hex::encode(signing_key.sign(string_to_sign.as_bytes()).to_bytes());

        Ok(format!("https://{}{canonical_uri}?{canonical_query}&X-Goog-Signature={signature}", self.host))
    }
}

/// Bucket access through the JSON API with bearer tokens from a [`TokenProvider`].
#[derive(Debug)]
pub struct GcsStorage {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    bucket: String,
    api_base_url: String,
    public_base_url: String,
    signer: Option<UrlSigner>,
}

impl GcsStorage {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        bucket: String,
        api_base_url: String,
        public_base_url: String,
    ) -> Self {
        Self {
            http,
            tokens,
            bucket,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signer: None,
        }
    }

    #[must_use]
    pub fn with_signer(mut self, signer: UrlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    async fn rejected(response: reqwest::Response, operation: &str) -> StorageError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status, body = %body, operation, "Storage request rejected");
        StorageError::Rejected { status, body }
    }
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(bucket = %self.bucket, size = body.len()))]
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<(), StorageError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.api_base_url, self.bucket);

        let response = self
            .http
            .post(url)
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response, "upload").await);
        }

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, encode_path(key))
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let signer =
            self.signer.as_ref().ok_or_else(|| StorageError::Signing("no signing key configured".to_string()))?;
        signer.sign_get(&self.bucket, key, expires_in, OffsetDateTime::now_utc())
    }

    async fn check(&self) -> Result<(), StorageError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/storage/v1/b/{}", self.api_base_url, self.bucket);

        let response =
            self.http.get(url).bearer_auth(token).send().await.map_err(|e| StorageError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response, "check").await);
        }

        Ok(())
    }
}
