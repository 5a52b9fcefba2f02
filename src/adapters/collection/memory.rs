use crate::adapters::collection::{MessageCollection, ParticipantFilter, ProfileDirectory};
use crate::domain::message::{Message, NewMessage};
use crate::domain::profile::UserProfile;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local message store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryMessageCollection {
    messages: RwLock<Vec<Message>>,
}

impl MemoryMessageCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message as-is, including a missing timestamp.
    pub async fn insert(&self, message: Message) {
        self.messages.write().await.push(message);
    }
}

#[async_trait]
impl MessageCollection for MemoryMessageCollection {
    async fn query(&self, filter: ParticipantFilter) -> Result<Vec<Message>> {
        Ok(self.messages.read().await.iter().filter(|m| filter.matches(m)).cloned().collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.messages.read().await.iter().find(|m| m.id() == id).cloned())
    }

    async fn add(&self, draft: NewMessage) -> Result<Message> {
        let message = draft.into_message(Uuid::new_v4(), OffsetDateTime::now_utc());
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool> {
        let mut messages = self.messages.write().await;
        match messages.iter_mut().find(|m| m.id() == id && m.recipient_id() == recipient_id) {
            Some(message) => {
                message.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryProfileDirectory {
    profiles: RwLock<HashMap<Uuid, UserProfile>>,
}

impl MemoryProfileDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, user_id: Uuid, profile: UserProfile) {
        self.profiles.write().await.insert(user_id, profile);
    }
}

#[async_trait]
impl ProfileDirectory for MemoryProfileDirectory {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }
}
