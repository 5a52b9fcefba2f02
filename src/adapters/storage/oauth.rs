use crate::adapters::storage::StorageError;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;
// Refresh a little before the provider's expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Supplies bearer tokens for storage requests.
#[async_trait]
pub trait TokenProvider: Send + Sync + std::fmt::Debug {
    async fn access_token(&self) -> Result<String, StorageError>;
}

#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, StorageError> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

const fn default_expires_in() -> i64 {
    ASSERTION_TTL_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Exchanges a service-account assertion for an access token (RFC 7523 JWT-bearer grant).
pub struct ServiceAccountTokenProvider {
    http: reqwest::Client,
    client_email: String,
    encoding_key: EncodingKey,
    token_uri: String,
    scope: String,
    cache: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenProvider")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountTokenProvider {
    /// # Errors
    /// Returns `StorageError::Auth` if the private key is not a valid RSA PEM.
    pub fn new(
        http: reqwest::Client,
        client_email: String,
        private_key_pem: &str,
        token_uri: String,
        scope: String,
    ) -> Result<Self, StorageError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| StorageError::Auth(format!("invalid service account key: {e}")))?;

        Ok(Self { http, client_email, encoding_key, token_uri, scope, cache: Mutex::new(None) })
    }

    fn sign_assertion(&self, now: i64) -> Result<String, StorageError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            sub: &self.client_email,
            scope: &self.scope,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| StorageError::Auth(format!("failed to sign assertion: {e}")))
    }

    #[tracing::instrument(level = "debug", skip(self), fields(token_uri = %self.token_uri))]
    async fn exchange(&self, now: i64) -> Result<CachedToken, StorageError> {
        let assertion = self.sign_assertion(now)?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Token exchange rejected");
            return Err(StorageError::Auth(format!("token endpoint returned status {}", status.as_u16())));
        }

        let token: TokenResponse =
            response.json().await.map_err(|e| StorageError::Auth(format!("malformed token response: {e}")))?;

        tracing::debug!(expires_in = token.expires_in, "Access token issued");
        Ok(CachedToken { access_token: token.access_token, expires_at: now + token.expires_in })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, StorageError> {
        let mut cache = self.cache.lock().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        if let Some(cached) = cache.as_ref()
            && cached.expires_at > now + EXPIRY_SKEW_SECS
        {
            return Ok(cached.access_token.clone());
        }

        let fresh = self.exchange(now).await?;
        let token = fresh.access_token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{Form, Json, Router, extract::State, http::StatusCode, routing::post};
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CLIENT_EMAIL: &str = "uploader@amora.iam.gserviceaccount.com";

    pub(crate) fn test_key_pair() -> (String, String) {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let private_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let public_pem = key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap();
        (private_pem, public_pem)
    }

    #[derive(Clone)]
    struct TokenServer {
        public_pem: String,
        audience: String,
        calls: Arc<AtomicUsize>,
        status: StatusCode,
    }

    async fn token_handler(
        State(server): State<TokenServer>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        server.calls.fetch_add(1, Ordering::SeqCst);
        if server.status != StatusCode::OK {
            return (server.status, Json(serde_json::json!({ "error": "invalid_grant" })));
        }
        if form.get("grant_type").map(String::as_str) != Some(JWT_BEARER_GRANT) {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "unsupported_grant_type" })));
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[server.audience.as_str()]);
        let key = DecodingKey::from_rsa_pem(server.public_pem.as_bytes()).unwrap();
        let Some(assertion) = form.get("assertion") else {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "invalid_request" })));
        };
        match decode::<serde_json::Value>(assertion, &key, &validation) {
            Ok(data) if data.claims["iss"] == CLIENT_EMAIL && data.claims["sub"] == CLIENT_EMAIL => {
                (StatusCode::OK, Json(serde_json::json!({ "access_token": "ya29.test", "expires_in": 3600 })))
            }
            _ => (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "invalid_grant" }))),
        }
    }

    async fn spawn_token_server(public_pem: String, status: StatusCode) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let uri = format!("http://{}/token", listener.local_addr().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route("/token", post(token_handler)).with_state(TokenServer {
            public_pem,
            audience: uri.clone(),
            calls: Arc::clone(&calls),
            status,
        });
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (uri, calls)
    }

    fn provider(private_pem: &str, token_uri: String) -> ServiceAccountTokenProvider {
        ServiceAccountTokenProvider::new(
            reqwest::Client::new(),
            CLIENT_EMAIL.into(),
            private_pem,
            token_uri,
            "https://www.googleapis.com/auth/devstorage.read_write".into(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_exchange_and_cache() {
        let (private_pem, public_pem) = test_key_pair();
        let (uri, calls) = spawn_token_server(public_pem, StatusCode::OK).await;
        let provider = provider(&private_pem, uri);

        assert_eq!(provider.access_token().await.unwrap(), "ya29.test");
        assert_eq!(provider.access_token().await.unwrap(), "ya29.test");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_triggers_new_exchange() {
        let (private_pem, public_pem) = test_key_pair();
        let (uri, calls) = spawn_token_server(public_pem, StatusCode::OK).await;
        let provider = provider(&private_pem, uri);

        provider.access_token().await.unwrap();
        *provider.cache.lock().await =
            Some(CachedToken { access_token: "stale".into(), expires_at: OffsetDateTime::now_utc().unix_timestamp() });

        assert_eq!(provider.access_token().await.unwrap(), "ya29.test");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_auth_error() {
        let (private_pem, public_pem) = test_key_pair();
        let (uri, _calls) = spawn_token_server(public_pem, StatusCode::UNAUTHORIZED).await;
        let provider = provider(&private_pem, uri);

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, StorageError::Auth(_)));
        assert!(!err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let result = ServiceAccountTokenProvider::new(
            reqwest::Client::new(),
            "a@b".into(),
            "not a pem",
            "http://localhost/token".into(),
            "scope".into(),
        );
        assert!(matches!(result, Err(StorageError::Auth(_))));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("abc".into());
        assert_eq!(provider.access_token().await.unwrap(), "abc");
    }
}
