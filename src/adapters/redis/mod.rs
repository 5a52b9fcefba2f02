use crate::config::MessagingConfig;
use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::Instrument;

pub mod change_repo;

pub use change_repo::ChangeRepository;

#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct Backoff {
    min: Duration,
    max: Duration,
}

#[derive(Debug)]
pub struct RedisClient {
    publisher: redis::aio::ConnectionManager,
    // Pattern (e.g. "messages:*") -> local fan-out
    subscriptions: Arc<DashMap<String, broadcast::Sender<PubSubMessage>>>,
    client: redis::Client,
    shutdown: watch::Receiver<bool>,
    channel_capacity: usize,
    backoff: Backoff,
}

impl RedisClient {
    /// Connects the publisher and prepares pattern subscriptions.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn new(url: &str, config: &MessagingConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_connection_manager().await?;

        Ok(Arc::new(Self {
            publisher,
            subscriptions: Arc::new(DashMap::new()),
            client,
            shutdown,
            channel_capacity: config.channel_capacity,
            backoff: Backoff {
                min: Duration::from_secs(config.pubsub_min_backoff_secs),
                max: Duration::from_secs(config.pubsub_max_backoff_secs),
            },
        }))
    }

    #[must_use]
    pub fn publisher(&self) -> redis::aio::ConnectionManager {
        self.publisher.clone()
    }

    /// Subscribes to a pattern, starting its listener on first use. Resolves
    /// once the first `PSUBSCRIBE` has been acknowledged.
    ///
    /// # Errors
    /// Returns an error if the subscription fails.
    pub async fn subscribe(&self, pattern: &str) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        if let Some(tx) = self.subscriptions.get(pattern) {
            return Ok(tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(self.channel_capacity);
        self.subscriptions.insert(pattern.to_string(), tx.clone());

        let (ready_tx, ready_rx) = oneshot::channel();
        let listener = PatternListener {
            client: self.client.clone(),
            pattern: pattern.to_string(),
            tx,
            shutdown: self.shutdown.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            backoff: self.backoff,
        };

        tokio::spawn(listener.run(ready_tx).instrument(tracing::debug_span!("pubsub_listener", pattern = %pattern)));

        ready_rx.await.map_err(|_| anyhow::anyhow!("pubsub listener for {pattern} stopped before subscribing"))?;
        Ok(rx)
    }

    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.publisher();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

struct PatternListener {
    client: redis::Client,
    pattern: String,
    tx: broadcast::Sender<PubSubMessage>,
    shutdown: watch::Receiver<bool>,
    subscriptions: Arc<DashMap<String, broadcast::Sender<PubSubMessage>>>,
    backoff: Backoff,
}

impl PatternListener {
    async fn run(mut self, ready_tx: oneshot::Sender<()>) {
        let retry_strategy =
            ExponentialBuilder::default().with_min_delay(self.backoff.min).with_max_delay(self.backoff.max);
        let mut ready_tx = Some(ready_tx);

        loop {
            let client = self.client.clone();
            let pattern = self.pattern.clone();
            let pubsub_result = (|| async {
                let mut pubsub = client.get_async_pubsub().await?;
                pubsub.psubscribe(&pattern).await?;
                Ok::<redis::aio::PubSub, redis::RedisError>(pubsub)
            })
            .retry(&retry_strategy)
            .notify(|e, delay| {
                tracing::warn!(error = %e, ?delay, "Pubsub subscription failed, retrying");
            })
            .await;

            let pubsub = match pubsub_result {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    tracing::error!(error = %e, "Pubsub subscription failed after retries");
                    break;
                }
            };

            tracing::info!(pattern = %self.pattern, "Subscribed to pubsub pattern");
            if let Some(ready) = ready_tx.take() {
                let _ = ready.send(());
            }

            let mut messages = pubsub.into_on_message();
            loop {
                tokio::select! {
                    _ = self.shutdown.changed() => {
                        self.subscriptions.remove(&self.pattern);
                        return;
                    }
                    msg = messages.next() => {
                        let Some(msg) = msg else {
                            tracing::warn!(pattern = %self.pattern, "Pubsub connection lost, reconnecting");
                            break;
                        };
                        let message = PubSubMessage {
                            channel: msg.get_channel_name().to_string(),
                            payload: msg.get_payload().unwrap_or_default(),
                        };
                        // No local receivers is fine.
                        let _ = self.tx.send(message);
                    }
                }
            }

            if *self.shutdown.borrow() {
                break;
            }
        }

        self.subscriptions.remove(&self.pattern);
    }
}
