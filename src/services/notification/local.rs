use crate::domain::message::ParticipantPair;
use crate::domain::notification::ChangeEvent;
use crate::services::notification::{ChangeNotifier, ChannelRegistry};
use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Single-process notifier. Changes made on other nodes are not observed.
#[derive(Debug)]
pub struct LocalChangeNotifier {
    registry: ChannelRegistry,
}

impl LocalChangeNotifier {
    #[must_use]
    pub fn new(channel_capacity: usize, gc_interval_secs: u64, shutdown: watch::Receiver<bool>) -> Self {
        let registry = ChannelRegistry::new(channel_capacity);
        registry.spawn_gc(gc_interval_secs, shutdown);
        Self { registry }
    }
}

#[async_trait]
impl ChangeNotifier for LocalChangeNotifier {
    fn watch(&self, user_id: Uuid) -> broadcast::Receiver<ChangeEvent> {
        self.registry.watch(user_id)
    }

    async fn publish(&self, participants: ParticipantPair) {
        for user_id in participants.as_array() {
            self.registry.deliver(user_id, ChangeEvent::MessagesChanged);
        }
        self.registry.record_send(true);
    }
}
