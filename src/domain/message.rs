use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// The two distinct users bound to a message, used for membership filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ParticipantPair([Uuid; 2]);

impl ParticipantPair {
    /// Returns `None` when both ids are the same user.
    #[must_use]
    pub fn new(a: Uuid, b: Uuid) -> Option<Self> {
        (a != b).then_some(Self([a, b]))
    }

    #[must_use]
    pub fn contains(&self, user_id: Uuid) -> bool {
        self.0.contains(&user_id)
    }

    /// The participant that is not `user_id`.
    #[must_use]
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.0 {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_array(&self) -> [Uuid; 2] {
        self.0
    }
}

/// Fallback applied to a message whose server timestamp has not resolved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFallback {
    Epoch,
    Now(OffsetDateTime),
}

impl TimestampFallback {
    #[must_use]
    pub fn now() -> Self {
        Self::Now(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub const fn resolve(self) -> OffsetDateTime {
        match self {
            Self::Epoch => OffsetDateTime::UNIX_EPOCH,
            Self::Now(t) => t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub(crate) id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) recipient_id: Uuid,
    pub(crate) content: String,
    pub(crate) created_at: Option<OffsetDateTime>,
    pub(crate) read: bool,
    pub(crate) participants: ParticipantPair,
}

impl Message {
    /// Builds a message whose participant pair is always `{sender, recipient}`.
    #[must_use]
    pub fn new(
        id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: String,
        created_at: Option<OffsetDateTime>,
        read: bool,
    ) -> Option<Self> {
        let participants = ParticipantPair::new(sender_id, recipient_id)?;
        Some(Self { id, sender_id, recipient_id, content, created_at, read, participants })
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn sender_id(&self) -> Uuid {
        self.sender_id
    }

    #[must_use]
    pub const fn recipient_id(&self) -> Uuid {
        self.recipient_id
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn created_at(&self) -> Option<OffsetDateTime> {
        self.created_at
    }

    #[must_use]
    pub const fn is_read(&self) -> bool {
        self.read
    }

    #[must_use]
    pub const fn participants(&self) -> ParticipantPair {
        self.participants
    }

    #[must_use]
    pub fn is_sent_by(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id
    }

    /// Unread and addressed to `user_id`.
    #[must_use]
    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        !self.read && self.recipient_id == user_id
    }

    #[must_use]
    pub fn timestamp_or(&self, fallback: TimestampFallback) -> OffsetDateTime {
        self.created_at.unwrap_or_else(|| fallback.resolve())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("Message content is empty")]
    Empty,
    #[error("Message content exceeds {0} characters")]
    TooLong(usize),
    #[error("Cannot send a message to yourself")]
    SelfAddressed,
}

/// A validated, not yet persisted message. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub(crate) sender_id: Uuid,
    pub(crate) recipient_id: Uuid,
    pub(crate) content: String,
    pub(crate) participants: ParticipantPair,
}

impl NewMessage {
    /// Trims and validates the content.
    ///
    /// # Errors
    /// Returns a `DraftError` when the content is blank, too long, or self-addressed.
    pub fn new(sender_id: Uuid, recipient_id: Uuid, content: &str, max_chars: usize) -> Result<Self, DraftError> {
        let participants = ParticipantPair::new(sender_id, recipient_id).ok_or(DraftError::SelfAddressed)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(DraftError::Empty);
        }
        if content.chars().count() > max_chars {
            return Err(DraftError::TooLong(max_chars));
        }

        Ok(Self { sender_id, recipient_id, content: content.to_string(), participants })
    }

    /// Materializes the draft once the store has assigned an id and timestamp.
    #[must_use]
    pub fn into_message(self, id: Uuid, created_at: OffsetDateTime) -> Message {
        Message {
            id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            content: self.content,
            created_at: Some(created_at),
            read: false,
            participants: self.participants,
        }
    }
}
