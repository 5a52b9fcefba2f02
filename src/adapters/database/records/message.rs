use crate::domain::message::Message;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) recipient_id: Uuid,
    pub(crate) content: String,
    pub(crate) created_at: Option<OffsetDateTime>,
    pub(crate) read: bool,
}

impl MessageRecord {
    /// `None` for a self-addressed row, which the schema rejects anyway.
    #[must_use]
    pub fn into_message(self) -> Option<Message> {
        Message::new(self.id, self.sender_id, self.recipient_id, self.content, self.created_at, self.read)
    }
}
