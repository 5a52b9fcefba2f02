use crate::adapters::collection::{MessageCollection, ParticipantFilter, ProfileDirectory};
use crate::domain::conversation::{self, Conversation, ThreadView, ViewState};
use crate::domain::message::{DraftError, Message, NewMessage, TimestampFallback};
use crate::domain::profile::ProfileSummary;
use crate::error::Result;
use crate::services::notification::ChangeNotifier;
use crate::services::subscription::{self, SubscriptionHandle};
use futures::future::join_all;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::Instrument;
use uuid::Uuid;

pub type ViewStream<T> = BoxStream<'static, ViewState<T>>;

pub const PROFILE_UNAVAILABLE: &str = "Failed to load user profile.";

/// Conversation views and message writes for one signed-in user at a time.
#[derive(Clone, Debug)]
pub struct ConversationService {
    collection: Arc<dyn MessageCollection>,
    profiles: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn ChangeNotifier>,
    max_message_chars: usize,
}

impl ConversationService {
    #[must_use]
    pub fn new(
        collection: Arc<dyn MessageCollection>,
        profiles: Arc<dyn ProfileDirectory>,
        notifier: Arc<dyn ChangeNotifier>,
        max_message_chars: usize,
    ) -> Self {
        Self { collection, profiles, notifier, max_message_chars }
    }

    async fn profile(&self, user_id: Uuid) -> Result<ProfileSummary> {
        Ok(self.profiles.get(user_id).await?.map_or_else(ProfileSummary::unknown, |p| p.summary()))
    }

    /// Looks up every counterpart in the snapshot. Failed lookups fall back to the unknown profile.
    async fn resolve_profiles(&self, me: Uuid, messages: &[Message]) -> HashMap<Uuid, ProfileSummary> {
        let counterparts: BTreeSet<Uuid> =
            messages.iter().filter_map(|m| m.participants().counterpart_of(me)).collect();

        let lookups = counterparts.into_iter().map(|id| async move { (id, self.profile(id).await) });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(summary) => Some((id, summary)),
                Err(e) => {
                    tracing::warn!(error = %e, counterpart_id = %id, "Profile lookup failed");
                    None
                }
            })
            .collect()
    }

    async fn conversations(&self, me: Uuid, messages: Vec<Message>) -> Vec<Conversation> {
        let profiles = self.resolve_profiles(me, &messages).await;
        conversation::aggregate(me, messages, &profiles, TimestampFallback::now())
    }

    /// Current conversation list, newest activity first.
    ///
    /// # Errors
    /// Returns an error if the message store cannot be queried.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list(&self, me: Uuid) -> Result<Vec<Conversation>> {
        let messages = self.collection.query(ParticipantFilter::new(me)).await?;
        Ok(self.conversations(me, messages).await)
    }

    /// Current messages with one counterpart, oldest first.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` when `counterpart` is the caller.
    /// Returns an error if the store or the profile directory fails.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn thread(&self, me: Uuid, counterpart: Uuid) -> Result<ThreadView> {
        if me == counterpart {
            return Err(DraftError::SelfAddressed.into());
        }

        let messages = self.collection.query(ParticipantFilter::new(me)).await?;
        Ok(ThreadView {
            counterpart_id: counterpart,
            counterpart: self.profile(counterpart).await?,
            messages: conversation::thread(me, counterpart, messages, TimestampFallback::now()),
        })
    }

    /// Live conversation list: `Loading`, then one `Loaded` per snapshot.
    /// Failed snapshots are logged and shown as an empty list.
    #[must_use]
    pub fn live_list(&self, me: Uuid) -> (ViewStream<Vec<Conversation>>, SubscriptionHandle) {
        let (snapshots, handle) =
            subscription::subscribe(Arc::clone(&self.collection), Arc::clone(&self.notifier), ParticipantFilter::new(me));

        let service = self.clone();
        let updates = snapshots.then(move |snapshot| {
            let service = service.clone();
            async move {
                let messages = snapshot.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, user_id = %me, "Conversation list subscription failed");
                    Vec::new()
                });
                ViewState::Loaded(service.conversations(me, messages).await)
            }
        });

        (stream::once(async { ViewState::Loading }).chain(updates).boxed(), handle)
    }

    /// Live thread with one counterpart. An unavailable profile puts the view in `Failed`.
    #[must_use]
    pub fn live_thread(&self, me: Uuid, counterpart: Uuid) -> (ViewStream<ThreadView>, SubscriptionHandle) {
        let (snapshots, handle) =
            subscription::subscribe(Arc::clone(&self.collection), Arc::clone(&self.notifier), ParticipantFilter::new(me));

        let service = self.clone();
        let header = Arc::new(OnceCell::new());
        let updates = snapshots.then(move |snapshot| {
            let service = service.clone();
            let header = Arc::clone(&header);
            async move {
                let summary = match header.get_or_try_init(|| service.profile(counterpart)).await {
                    Ok(summary) => summary.clone(),
                    Err(e) => {
                        tracing::warn!(error = %e, counterpart_id = %counterpart, "Profile lookup failed");
                        return ViewState::Failed(PROFILE_UNAVAILABLE.to_string());
                    }
                };
                let messages = snapshot.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, user_id = %me, "Thread subscription failed");
                    Vec::new()
                });

                ViewState::Loaded(ThreadView {
                    counterpart_id: counterpart,
                    counterpart: summary,
                    messages: conversation::thread(me, counterpart, messages, TimestampFallback::now()),
                })
            }
        });

        (stream::once(async { ViewState::Loading }).chain(updates).boxed(), handle)
    }

    /// Persists a message and notifies both participants. The caller's views
    /// pick it up from the next snapshot.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` for blank, oversized or self-addressed messages.
    /// Returns an error if the store rejects the write.
    #[tracing::instrument(err(level = "warn"), skip(self, content), fields(message_id = tracing::field::Empty))]
    pub async fn send(&self, me: Uuid, counterpart: Uuid, content: &str) -> Result<Message> {
        let draft = NewMessage::new(me, counterpart, content, self.max_message_chars)?;
        let message = self.collection.add(draft).await?;
        tracing::Span::current().record("message_id", tracing::field::display(message.id()));

        self.notifier.publish(message.participants()).await;
        Ok(message)
    }

    /// Marks a message read in the background. Failures are only logged.
    pub fn mark_read(&self, me: Uuid, message_id: Uuid) {
        let service = self.clone();
        tokio::spawn(
            async move {
                if let Err(e) = service.apply_read(me, message_id).await {
                    tracing::error!(error = %e, "Failed to mark message read");
                }
            }
            .instrument(tracing::info_span!("mark_read", user_id = %me, message_id = %message_id)),
        );
    }

    async fn apply_read(&self, me: Uuid, message_id: Uuid) -> Result<()> {
        let Some(message) = self.collection.get(message_id).await? else {
            tracing::debug!("Message not found");
            return Ok(());
        };

        if self.collection.mark_read(message_id, me).await? {
            self.notifier.publish(message.participants()).await;
        } else {
            tracing::debug!("Caller is not the recipient");
        }
        Ok(())
    }
}
