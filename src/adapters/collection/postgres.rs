use crate::adapters::collection::{MessageCollection, ParticipantFilter, ProfileDirectory};
use crate::adapters::database::DbPool;
use crate::adapters::database::records::{MessageRecord, ProfileRecord};
use crate::domain::message::{Message, NewMessage};
use crate::domain::profile::UserProfile;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, content, created_at, read";

/// Containment rather than `= ANY(..)` so `idx_messages_participants` (GIN) applies.
const PARTICIPANT_FILTER: &str = "participants @> ARRAY[$1]::uuid[]";

fn into_messages(records: Vec<MessageRecord>) -> Vec<Message> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id;
            let message = record.into_message();
            if message.is_none() {
                tracing::warn!(message_id = %id, "Skipping self-addressed message row");
            }
            message
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct PgMessageCollection {
    pool: DbPool,
}

impl PgMessageCollection {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageCollection for PgMessageCollection {
    #[tracing::instrument(level = "debug", skip(self), fields(participant = %filter.participant))]
    async fn query(&self, filter: ParticipantFilter) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {PARTICIPANT_FILTER}"
        ))
        .bind(filter.participant)
        .fetch_all(&self.pool)
        .await?;

        Ok(into_messages(records))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>> {
        let record =
            sqlx::query_as::<_, MessageRecord>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.and_then(MessageRecord::into_message))
    }

    #[tracing::instrument(level = "debug", skip(self, draft), fields(sender_id = %draft.sender_id))]
    async fn add(&self, draft: NewMessage) -> Result<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r"
            INSERT INTO messages (sender_id, recipient_id, content, participants)
            VALUES ($1, $2, $3, $4)
            RETURNING {MESSAGE_COLUMNS}
            "
        ))
        .bind(draft.sender_id)
        .bind(draft.recipient_id)
        .bind(&draft.content)
        .bind(draft.participants.as_array().to_vec())
        .fetch_one(&self.pool)
        .await?;

        record.into_message().ok_or(AppError::Internal)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE messages SET read = TRUE WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PgProfileDirectory {
    pool: DbPool,
}

impl PgProfileDirectory {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileDirectory for PgProfileDirectory {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT name, photo_url, photo, photos FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }
}
