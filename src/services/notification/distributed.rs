use crate::adapters::redis::ChangeRepository;
use crate::config::MessagingConfig;
use crate::domain::message::ParticipantPair;
use crate::domain::notification::ChangeEvent;
use crate::services::notification::{ChangeNotifier, ChannelRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;
use uuid::Uuid;

/// Cross-node notifier: publishes through Redis and fans received events out
/// to local watchers.
#[derive(Debug)]
pub struct RedisChangeNotifier {
    repo: Arc<ChangeRepository>,
    registry: ChannelRegistry,
}

impl RedisChangeNotifier {
    /// Subscribes to the change pattern and starts the dispatcher.
    ///
    /// # Errors
    /// Returns an error if the subscription to `PubSub` fails.
    pub async fn new(
        repo: Arc<ChangeRepository>,
        config: &MessagingConfig,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let registry = ChannelRegistry::new(config.channel_capacity);
        registry.spawn_gc(config.gc_interval_secs, shutdown.clone());

        let mut changes = repo.subscribe().await?;
        let dispatcher_repo = Arc::clone(&repo);
        let dispatcher_registry = registry.clone();
        let mut dispatcher_shutdown = shutdown;

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = dispatcher_shutdown.changed() => break,
                        result = changes.recv() => match result {
                            Ok(message) => {
                                if let Some(notification) = dispatcher_repo.decode(&message) {
                                    dispatcher_registry.deliver(notification.user_id, notification.event);
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!(missed = n, "Change dispatcher lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
            .instrument(tracing::info_span!("change_dispatcher")),
        );

        Ok(Self { repo, registry })
    }
}

#[async_trait]
impl ChangeNotifier for RedisChangeNotifier {
    fn watch(&self, user_id: Uuid) -> broadcast::Receiver<ChangeEvent> {
        self.registry.watch(user_id)
    }

    #[tracing::instrument(skip(self))]
    async fn publish(&self, participants: ParticipantPair) {
        for user_id in participants.as_array() {
            let result = self.repo.publish(user_id, ChangeEvent::MessagesChanged).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, user_id = %user_id, "Failed to publish change");
            }
            self.registry.record_send(result.is_ok());
        }
    }
}
