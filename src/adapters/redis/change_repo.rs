use crate::adapters::redis::{PubSubMessage, RedisClient};
use crate::domain::notification::{ChangeEvent, ChangeNotification};
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const DEFAULT_CHANNEL_PREFIX: &str = "messages:";

/// Per-user change channels on Redis pub/sub: `<prefix><user id>`, one byte payload.
#[derive(Debug, Clone)]
pub struct ChangeRepository {
    redis: Arc<RedisClient>,
    channel_prefix: String,
}

impl ChangeRepository {
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, channel_prefix: String) -> Self {
        Self { redis, channel_prefix }
    }

    /// # Errors
    /// Returns an error if the Redis operation fails.
    pub async fn publish(&self, user_id: Uuid, event: ChangeEvent) -> anyhow::Result<()> {
        let channel = format!("{}{user_id}", self.channel_prefix);
        let mut conn = self.redis.publisher();
        conn.publish::<_, _, i64>(&channel, &[event as u8]).await?;
        Ok(())
    }

    /// Subscribes to change events for every user.
    ///
    /// # Errors
    /// Returns an error if the subscription fails.
    pub async fn subscribe(&self) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        self.redis.subscribe(&format!("{}*", self.channel_prefix)).await
    }

    /// Decodes a raw pub/sub message; foreign or malformed messages yield `None`.
    #[must_use]
    pub fn decode(&self, message: &PubSubMessage) -> Option<ChangeNotification> {
        decode(&self.channel_prefix, message)
    }

    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.redis.ping().await
    }
}

fn decode(prefix: &str, message: &PubSubMessage) -> Option<ChangeNotification> {
    let user_id = Uuid::parse_str(message.channel.strip_prefix(prefix)?).ok()?;
    let event = ChangeEvent::try_from(*message.payload.first()?).ok()?;
    Some(ChangeNotification { user_id, event })
}
