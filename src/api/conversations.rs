use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::conversations::{
    ConversationResponse, SendMessageRequest, SendMessageResponse, ThreadResponse, ViewFrame,
};
use crate::domain::conversation::ViewState;
use crate::error::{AppError, Result};
use crate::services::conversation_service::ViewStream;
use crate::services::subscription::SubscriptionHandle;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

const SUBSCRIPTION_ENDED: &str = "Live updates stopped.";

#[derive(Deserialize)]
pub struct LiveParams {
    token: String,
}

/// Lists the caller's conversations, newest activity first.
///
/// # Errors
/// Returns an error if the message store cannot be queried.
pub async fn list(auth_user: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<ConversationResponse>>> {
    let conversations = state.conversation_service.list(auth_user.user_id).await?;
    Ok(Json(conversations.iter().map(ConversationResponse::from).collect()))
}

/// Messages exchanged with one counterpart, oldest first.
///
/// # Errors
/// Returns `AppError::BadRequest` if the counterpart is the caller.
pub async fn thread(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(counterpart_id): Path<Uuid>,
) -> Result<Json<ThreadResponse>> {
    let view = state.conversation_service.thread(auth_user.user_id, counterpart_id).await?;
    Ok(Json(ThreadResponse::from(&view)))
}

/// Sends a text message to `counterpart_id`.
///
/// # Errors
/// Returns `AppError::BadRequest` for empty, oversized or self-addressed messages.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(counterpart_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let message = state.conversation_service.send(auth_user.user_id, counterpart_id, &request.content).await?;
    Ok((StatusCode::CREATED, Json(SendMessageResponse { id: message.id() })))
}

/// Accepts a read receipt. The update happens in the background.
pub async fn mark_read(auth_user: AuthUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    state.conversation_service.mark_read(auth_user.user_id, id);
    StatusCode::ACCEPTED
}

pub async fn live_list(ws: WebSocketUpgrade, Query(params): Query<LiveParams>, State(state): State<AppState>) -> Response {
    let user = match AuthUser::from_token(&params.token, &state) {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake failed: invalid token");
            return e.into_response();
        }
    };

    ws.on_upgrade(move |socket| {
        let (view, handle) = state.conversation_service.live_list(user.user_id);
        pump_view::<_, Vec<ConversationResponse>>(socket, view, handle, state.shutdown_rx)
            .instrument(tracing::info_span!("live_list", user_id = %user.user_id))
    })
}

pub async fn live_thread(
    ws: WebSocketUpgrade,
    Path(counterpart_id): Path<Uuid>,
    Query(params): Query<LiveParams>,
    State(state): State<AppState>,
) -> Response {
    let user = match AuthUser::from_token(&params.token, &state) {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake failed: invalid token");
            return e.into_response();
        }
    };
    if user.user_id == counterpart_id {
        return AppError::BadRequest("Cannot open a conversation with yourself".to_string()).into_response();
    }

    ws.on_upgrade(move |socket| {
        let (view, handle) = state.conversation_service.live_thread(user.user_id, counterpart_id);
        pump_view::<_, ThreadResponse>(socket, view, handle, state.shutdown_rx)
            .instrument(tracing::info_span!("live_thread", user_id = %user.user_id, counterpart_id = %counterpart_id))
    })
}

async fn send_frame<R: Serialize>(sink: &mut SplitSink<WebSocket, WsMessage>, frame: &ViewFrame<R>) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => sink.send(WsMessage::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode view frame");
            false
        }
    }
}

/// Forwards view states to the socket until either side goes away.
async fn pump_view<T, R>(
    socket: WebSocket,
    mut view: ViewStream<T>,
    handle: SubscriptionHandle,
    mut shutdown: watch::Receiver<bool>,
) where
    R: Serialize,
    ViewFrame<R>: From<ViewState<T>>,
{
    let (mut sink, mut inbound) = socket.split();
    tracing::debug!("Live view opened");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            state = view.next() => {
                let Some(state) = state else {
                    send_frame(&mut sink, &ViewFrame::<R>::Error(SUBSCRIPTION_ENDED.to_string())).await;
                    break;
                };
                if !send_frame(&mut sink, &ViewFrame::<R>::from(state)).await {
                    break;
                }
            }
            msg = inbound.next() => match msg {
                Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            changed = shutdown.changed() => if changed.is_err() { break },
        }
    }

    handle.cancel();
    let _ = sink.send(WsMessage::Close(None)).await;
    tracing::debug!("Live view closed");
}
