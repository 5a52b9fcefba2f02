use crate::api::schemas::unix_millis;
use crate::domain::conversation::{Conversation, ThreadView, ViewState};
use crate::domain::message::Message;
use crate::domain::profile::ProfileSummary;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    /// Unix milliseconds; `None` while the server timestamp is pending.
    pub created_at: Option<i64>,
    pub read: bool,
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id(),
            sender_id: message.sender_id(),
            recipient_id: message.recipient_id(),
            content: message.content().to_string(),
            created_at: message.created_at().map(unix_millis),
            read: message.is_read(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub counterpart_id: Uuid,
    pub counterpart: ProfileSummary,
    pub last_message: MessageResponse,
    pub unread_count: usize,
    pub messages: Vec<MessageResponse>,
}

impl From<&Conversation> for ConversationResponse {
    fn from(conversation: &Conversation) -> Self {
        Self {
            counterpart_id: conversation.counterpart_id,
            counterpart: conversation.counterpart.clone(),
            last_message: MessageResponse::from(&conversation.last_message),
            unread_count: conversation.unread_count,
            messages: conversation.messages.iter().map(MessageResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResponse {
    pub counterpart_id: Uuid,
    pub counterpart: ProfileSummary,
    pub messages: Vec<MessageResponse>,
}

impl From<&ThreadView> for ThreadResponse {
    fn from(view: &ThreadView) -> Self {
        Self {
            counterpart_id: view.counterpart_id,
            counterpart: view.counterpart.clone(),
            messages: view.messages.iter().map(MessageResponse::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub id: Uuid,
}

/// One live-view frame: `{"state": "loading" | "loaded" | "error", "data"?: ...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "lowercase")]
pub enum ViewFrame<T> {
    Loading,
    Loaded(T),
    Error(String),
}

impl From<ViewState<Vec<Conversation>>> for ViewFrame<Vec<ConversationResponse>> {
    fn from(state: ViewState<Vec<Conversation>>) -> Self {
        match state {
            ViewState::Loading => Self::Loading,
            ViewState::Loaded(list) => Self::Loaded(list.iter().map(ConversationResponse::from).collect()),
            ViewState::Failed(reason) => Self::Error(reason),
        }
    }
}

impl From<ViewState<ThreadView>> for ViewFrame<ThreadResponse> {
    fn from(state: ViewState<ThreadView>) -> Self {
        match state {
            ViewState::Loading => Self::Loading,
            ViewState::Loaded(view) => Self::Loaded(ThreadResponse::from(&view)),
            ViewState::Failed(reason) => Self::Error(reason),
        }
    }
}
