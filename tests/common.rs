#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc, clippy::clone_on_ref_ptr, unreachable_pub)]
use amora_server::adapters::collection::{MemoryMessageCollection, MemoryProfileDirectory};
use amora_server::adapters::database::{self, DbPool};
use amora_server::adapters::redis::RedisClient;
use amora_server::api::{self, MgmtState};
use amora_server::config::Config;
use amora_server::domain::auth::Claims;
use amora_server::domain::profile::UserProfile;
use amora_server::AppBuilder;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use clap::Parser;
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret";
pub const BUCKET: &str = "test-bucket";
pub const STORAGE_TOKEN: &str = "test-storage-token";
pub const PUBLIC_BASE: &str = "https://cdn.test";

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("amora_server=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

/// Bare configuration with defaults for everything but the session secret.
pub fn test_config() -> Config {
    Config::try_parse_from(["amora-server", "--jwt-secret", JWT_SECRET]).unwrap()
}

/// Postgres from `DATABASE_URL`, migrated. `None` when the variable is unset.
pub async fn get_test_pool() -> Option<DbPool> {
    setup_tracing();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let pool = database::init_pool(&database_url).await.expect("Failed to connect to DB. Is Postgres running?");
    database::migrate(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

/// A fresh Redis connection from `REDIS_URL`. `None` when the variable is unset.
pub async fn get_test_pubsub(shutdown_rx: watch::Receiver<bool>) -> Option<Arc<RedisClient>> {
    setup_tracing();
    let Ok(redis_url) = std::env::var("REDIS_URL") else {
        tracing::warn!("REDIS_URL not set, skipping Redis test");
        return None;
    };

    Some(
        RedisClient::new(&redis_url, &test_config().messaging, shutdown_rx)
            .await
            .expect("Failed to connect to Redis. Is it running?"),
    )
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub name: String,
    pub content_type: String,
    pub body: Bytes,
}

/// In-process stand-in for the storage JSON API.
#[derive(Debug, Clone, Default)]
pub struct MockBucket {
    pub objects: Arc<Mutex<Vec<StoredObject>>>,
    failure: Arc<AtomicU16>,
}

impl MockBucket {
    /// Makes every request fail with `status` (0 restores normal behaviour).
    pub fn fail_with(&self, status: u16) {
        self.failure.store(status, Ordering::SeqCst);
    }

    fn failure(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.failure.load(Ordering::SeqCst)).ok()
    }

    async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/upload/storage/v1/b/{bucket}/o", post(mock_upload))
            .route("/storage/v1/b/{bucket}", get(mock_bucket))
            .with_state(self.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        url
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {STORAGE_TOKEN}"))
}

async fn mock_upload(
    State(bucket): State<MockBucket>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(status) = bucket.failure() {
        return (status, "quota exceeded for project amora-secret-project").into_response();
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if name != BUCKET || params.get("uploadType").map(String::as_str) != Some("media") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let Some(object_name) = params.get("name").cloned() else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let content_type =
        headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
    bucket.objects.lock().await.push(StoredObject { name: object_name.clone(), content_type, body });

    Json(json!({ "bucket": BUCKET, "name": object_name })).into_response()
}

async fn mock_bucket(State(bucket): State<MockBucket>, Path(name): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(status) = bucket.failure() {
        return status.into_response();
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if name != BUCKET {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({ "name": BUCKET })).into_response()
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub bucket: MockBucket,
    pub collection: Arc<MemoryMessageCollection>,
    pub profiles: Arc<MemoryProfileDirectory>,
    shutdown_tx: watch::Sender<bool>,
}

pub type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_args(&[]).await
    }

    pub async fn spawn_with_args(extra: &[&str]) -> Self {
        setup_tracing();

        let bucket = MockBucket::default();
        let storage_url = bucket.spawn().await;

        let mut argv = vec![
            "amora-server",
            "--jwt-secret",
            JWT_SECRET,
            "--storage-bucket",
            BUCKET,
            "--static-token",
            STORAGE_TOKEN,
            "--api-base-url",
            &storage_url,
            "--public-base-url",
            PUBLIC_BASE,
            "--host",
            "127.0.0.1",
        ];
        argv.extend_from_slice(extra);
        let config = Config::try_parse_from(argv).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let collection = Arc::new(MemoryMessageCollection::new());
        let profiles = Arc::new(MemoryProfileDirectory::new());

        let app = AppBuilder::new(config.clone())
            .with_collection(collection.clone())
            .with_profiles(profiles.clone())
            .with_shutdown_rx(shutdown_rx.clone())
            .build()
            .await
            .unwrap();

        let app_router = api::app_router(config.clone(), app.services, shutdown_rx);
        let mgmt_router = api::mgmt_router(MgmtState { health_service: app.health_service });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app_router).await.unwrap();
        });

        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router).await.unwrap();
        });

        Self {
            server_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            config,
            bucket,
            collection,
            profiles,
            shutdown_tx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn add_profile(&self, name: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        let profile = UserProfile {
            name: Some(name.to_string()),
            photos: vec![format!("{PUBLIC_BASE}/{name}.jpg")],
            ..UserProfile::default()
        };
        self.profiles.put(user_id, profile).await;
        user_id
    }

    pub fn token_for(user_id: Uuid) -> String {
        Claims::new(user_id, 3600).encode(JWT_SECRET).unwrap()
    }

    pub async fn send_message(&self, from: Uuid, to: Uuid, content: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/api/conversations/{to}/messages", self.server_url))
            .bearer_auth(Self::token_for(from))
            .json(&json!({ "content": content }))
            .send()
            .await
            .unwrap()
    }

    pub async fn list(&self, user_id: Uuid) -> serde_json::Value {
        let resp = self
            .client
            .get(format!("{}/api/conversations", self.server_url))
            .bearer_auth(Self::token_for(user_id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }

    pub async fn connect_ws(&self, path: &str, user_id: Uuid) -> WsClient {
        let url = format!("{}{path}?token={}", self.ws_url, Self::token_for(user_id));
        let (ws, _) = tokio_tungstenite::connect_async(url).await.expect("Failed to connect");
        ws
    }
}

/// Next JSON text frame, skipping control frames.
pub async fn next_frame(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket closed")
            .expect("Socket error");

        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Retries `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}
