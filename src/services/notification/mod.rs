use crate::domain::message::ParticipantPair;
use crate::domain::notification::ChangeEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, UpDownCounter},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;
use uuid::Uuid;

pub mod distributed;
pub mod local;

pub use distributed::RedisChangeNotifier;
pub use local::LocalChangeNotifier;

/// Tells live views that a user's messages changed.
#[async_trait]
pub trait ChangeNotifier: Send + Sync + std::fmt::Debug {
    /// A receiver that yields an event whenever `user_id`'s messages change.
    fn watch(&self, user_id: Uuid) -> broadcast::Receiver<ChangeEvent>;

    /// Notifies both participants of a message.
    async fn publish(&self, participants: ParticipantPair);
}

#[derive(Clone, Debug)]
struct Metrics {
    sends_total: Counter<u64>,
    received_total: Counter<u64>,
    unrouted_total: Counter<u64>,
    active_channels: UpDownCounter<i64>,
    gc_duration_seconds: Histogram<f64>,
    gc_reclaimed_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("amora-server");
        Self {
            sends_total: meter
                .u64_counter("change_notification_sends_total")
                .with_description("Total change notification publish attempts")
                .build(),
            received_total: meter
                .u64_counter("change_notification_received_total")
                .with_description("Total change notifications received from PubSub")
                .build(),
            unrouted_total: meter
                .u64_counter("change_notification_unrouted_total")
                .with_description("Change notifications with no local watchers")
                .build(),
            active_channels: meter
                .i64_up_down_counter("change_notification_active_channels")
                .with_description("Number of active local change channels")
                .build(),
            gc_duration_seconds: meter
                .f64_histogram("change_notification_gc_duration_seconds")
                .with_description("Time taken to perform a single GC iteration")
                .build(),
            gc_reclaimed_total: meter
                .u64_counter("change_notification_gc_reclaimed_total")
                .with_description("Total number of idle channels reclaimed by GC")
                .build(),
        }
    }
}

/// Local fan-out: one broadcast channel per watched user.
#[derive(Debug, Clone)]
pub(crate) struct ChannelRegistry {
    channels: Arc<DashMap<Uuid, broadcast::Sender<ChangeEvent>>>,
    capacity: usize,
    metrics: Metrics,
}

impl ChannelRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { channels: Arc::new(DashMap::new()), capacity: capacity.max(1), metrics: Metrics::new() }
    }

    pub(crate) fn watch(&self, user_id: Uuid) -> broadcast::Receiver<ChangeEvent> {
        self.channels
            .entry(user_id)
            .or_insert_with(|| {
                self.metrics.active_channels.add(1, &[]);
                broadcast::channel(self.capacity).0
            })
            .subscribe()
    }

    /// Returns `false` when nobody local is watching `user_id`.
    pub(crate) fn deliver(&self, user_id: Uuid, event: ChangeEvent) -> bool {
        let label = [KeyValue::new("event", format!("{event:?}"))];
        self.metrics.received_total.add(1, &label);

        let delivered = self.channels.get(&user_id).is_some_and(|tx| tx.send(event).is_ok());
        if !delivered {
            self.metrics.unrouted_total.add(1, &label);
        }
        delivered
    }

    fn record_send(&self, ok: bool) {
        self.metrics.sends_total.add(1, &[KeyValue::new("status", if ok { "sent" } else { "error" })]);
    }

    /// Drops channels whose watchers have all gone away.
    pub(crate) fn collect_garbage(&self) -> u64 {
        let start = std::time::Instant::now();
        let mut reclaimed = 0;

        self.channels.retain(|_, sender| {
            let active = sender.receiver_count() > 0;
            if !active {
                self.metrics.active_channels.add(-1, &[]);
                reclaimed += 1;
            }
            active
        });

        self.metrics.gc_duration_seconds.record(start.elapsed().as_secs_f64(), &[]);
        if reclaimed > 0 {
            self.metrics.gc_reclaimed_total.add(reclaimed, &[]);
        }
        reclaimed
    }

    pub(crate) fn spawn_gc(&self, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        let registry = self.clone();
        tokio::spawn(
            async move {
                let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let reclaimed = registry.collect_garbage();
                            if reclaimed > 0 {
                                tracing::debug!(reclaimed, "Reclaimed idle change channels");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }
            .instrument(tracing::info_span!("change_channel_gc")),
        );
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}
