use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

fn component_status(component: &'static str, result: Result<(), String>, healthy: &mut bool) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, component, "Readiness probe failed");
            *healthy = false;
            "error".to_string()
        }
    }
}

/// Readiness probe: checks the message store, the bucket and `PubSub` when configured.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (db_res, storage_res, pubsub_res) = tokio::join!(
        state.health_service.check_db(),
        state.health_service.check_storage(),
        state.health_service.check_pubsub()
    );

    let mut healthy = true;
    let response = HealthResponse {
        database: component_status("database", db_res, &mut healthy),
        storage: component_status("storage", storage_res, &mut healthy),
        pubsub: pubsub_res.map(|res| component_status("pubsub", res, &mut healthy)),
        status: String::new(),
    };

    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let response = HealthResponse { status: if healthy { "ok" } else { "error" }.to_string(), ..response };

    (status_code, Json(response))
}
