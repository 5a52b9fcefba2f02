use crate::domain::message::{Message, NewMessage};
use crate::domain::profile::UserProfile;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryMessageCollection, MemoryProfileDirectory};
pub use postgres::{PgMessageCollection, PgProfileDirectory};

/// Restricts a query to messages the given user takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantFilter {
    pub participant: Uuid,
}

impl ParticipantFilter {
    #[must_use]
    pub const fn new(participant: Uuid) -> Self {
        Self { participant }
    }

    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        message.participants().contains(self.participant)
    }
}

/// The message store. Identifiers and timestamps are assigned by the store.
#[async_trait]
pub trait MessageCollection: Send + Sync + std::fmt::Debug {
    /// Every message matching the filter, in no particular order.
    async fn query(&self, filter: ParticipantFilter) -> Result<Vec<Message>>;

    async fn get(&self, id: Uuid) -> Result<Option<Message>>;

    async fn add(&self, draft: NewMessage) -> Result<Message>;

    /// Flags a message read. Only its recipient may do so; returns whether a
    /// message was updated.
    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// Read-only lookup of user profile documents.
#[async_trait]
pub trait ProfileDirectory: Send + Sync + std::fmt::Debug {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>>;
}
