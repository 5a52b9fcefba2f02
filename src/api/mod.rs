use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::health_service::HealthService;
use crate::services::upload_service::UploadGateway;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Request};
use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod conversations;
pub mod health;
pub mod middleware;
pub mod schemas;
pub mod uploads;

/// Multipart framing allowance on top of the file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

static REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub upload_gateway: UploadGateway,
    pub conversation_service: ConversationService,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub upload_gateway: UploadGateway,
    pub conversation_service: ConversationService,
}

/// Configures and returns the primary application router.
pub fn app_router(config: Config, services: ServiceContainer, shutdown_rx: tokio::sync::watch::Receiver<bool>) -> Router {
    let body_limit = services.upload_gateway.max_upload_bytes().saturating_add(MULTIPART_OVERHEAD_BYTES);
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);

    let state = AppState {
        config,
        upload_gateway: services.upload_gateway,
        conversation_service: services.conversation_service,
        shutdown_rx,
    };

    let upload_routes = Router::new()
        .route("/upload", post(uploads::upload))
        .route("/photos/upload", post(uploads::upload))
        .layer(DefaultBodyLimit::max(body_limit));

    // Live views stay open past the request timeout; only the upgrade is timed.
    let conversation_routes = Router::new()
        .route("/conversations", get(conversations::list))
        .route("/conversations/live", get(conversations::live_list))
        .route("/conversations/{counterpartId}", get(conversations::thread))
        .route("/conversations/{counterpartId}/live", get(conversations::live_thread))
        .route("/conversations/{counterpartId}/messages", post(conversations::send_message))
        .route("/messages/{id}/read", post(conversations::mark_read));

    let api_routes = upload_routes
        .merge(conversation_routes)
        .route("/test-firebase", get(uploads::storage_config_check));

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(request_timeout);

    Router::new()
        .nest("/api", api_routes)
        .layer(timeout)
        .layer(PropagateRequestIdLayer::new(REQUEST_ID.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(|response: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                    let status = response.status();
                    span.record("http.response.status_code", status.as_u16());

                    tracing::info!(
                        latency_ms = %latency.as_millis(),
                        status = %status.as_u16(),
                        "request completed"
                    );
                })
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(REQUEST_ID.clone(), MakeRequestUuid))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
