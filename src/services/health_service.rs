use crate::adapters::collection::MessageCollection;
use crate::adapters::redis::ChangeRepository;
use crate::adapters::storage::ObjectStorage;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
struct Metrics {
    status: Gauge<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("amora-server");
        Self {
            status: meter
                .i64_gauge("amora_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    collection: Arc<dyn MessageCollection>,
    storage: Arc<dyn ObjectStorage>,
    pubsub: Option<Arc<ChangeRepository>>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(
        collection: Arc<dyn MessageCollection>,
        storage: Arc<dyn ObjectStorage>,
        pubsub: Option<Arc<ChangeRepository>>,
        config: HealthConfig,
    ) -> Self {
        Self { collection, storage, pubsub, config, metrics: Metrics::new() }
    }

    async fn probe<E: Display>(
        &self,
        component: &'static str,
        limit: Duration,
        check: impl Future<Output = Result<(), E>>,
    ) -> Result<(), String> {
        let result = match timeout(limit, check).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{component} check failed: {e}")),
            Err(_) => Err(format!("{component} check timed out")),
        };
        self.metrics.status.record(i64::from(result.is_ok()), &[KeyValue::new("component", component)]);
        result
    }

    /// Checks the message store.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_db(&self) -> Result<(), String> {
        self.probe("database", Duration::from_millis(self.config.db_timeout_ms), self.collection.ping()).await
    }

    /// Checks that the bucket is reachable with the configured credentials.
    ///
    /// # Errors
    /// Returns a string describing the failure if the bucket is unreachable.
    pub async fn check_storage(&self) -> Result<(), String> {
        self.probe("storage", Duration::from_millis(self.config.storage_timeout_ms), self.storage.check()).await
    }

    /// Checks `PubSub` connectivity; `None` when change notifications are process-local.
    pub async fn check_pubsub(&self) -> Option<Result<(), String>> {
        let pubsub = self.pubsub.as_ref()?;
        Some(self.probe("pubsub", Duration::from_millis(self.config.db_timeout_ms), pubsub.ping()).await)
    }
}
