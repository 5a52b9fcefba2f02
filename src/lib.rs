#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::collection::{
    MemoryMessageCollection, MemoryProfileDirectory, MessageCollection, PgMessageCollection, PgProfileDirectory,
    ProfileDirectory,
};
use crate::adapters::database::DbPool;
use crate::adapters::redis::{ChangeRepository, RedisClient, change_repo::DEFAULT_CHANNEL_PREFIX};
use crate::adapters::storage::ObjectStorage;
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::health_service::HealthService;
use crate::services::notification::{ChangeNotifier, LocalChangeNotifier, RedisChangeNotifier};
use crate::services::upload_service::UploadGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
}

/// Wires adapters into services. Anything not supplied falls back to the
/// in-process implementation, except storage which is built from config.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    pubsub: Option<Arc<RedisClient>>,
    storage: Option<Arc<dyn ObjectStorage>>,
    collection: Option<Arc<dyn MessageCollection>>,
    profiles: Option<Arc<dyn ProfileDirectory>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, pubsub: None, storage: None, collection: None, profiles: None, shutdown_rx: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Arc<RedisClient>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_collection(mut self, collection: Arc<dyn MessageCollection>) -> Self {
        self.collection = Some(collection);
        self
    }

    #[must_use]
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileDirectory>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    #[must_use]
    pub fn with_shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Builds the services.
    ///
    /// # Errors
    /// Returns an error if the shutdown receiver is missing, the storage
    /// backend cannot be configured or the `PubSub` subscription fails.
    pub async fn build(self) -> anyhow::Result<App> {
        let shutdown_rx = self.shutdown_rx.ok_or_else(|| anyhow::anyhow!("Shutdown receiver is required"))?;
        let messaging = &self.config.messaging;

        let storage = match self.storage {
            Some(storage) => storage,
            None => adapters::storage::from_config(
                &self.config.storage,
                Duration::from_secs(self.config.server.request_timeout_secs),
            )
            .await?,
        };

        let collection: Arc<dyn MessageCollection> = match (self.collection, &self.pool) {
            (Some(collection), _) => collection,
            (None, Some(pool)) => Arc::new(PgMessageCollection::new(pool.clone())),
            (None, None) => {
                tracing::warn!("No database configured, messages are kept in memory");
                Arc::new(MemoryMessageCollection::new())
            }
        };

        let profiles: Arc<dyn ProfileDirectory> = match (self.profiles, &self.pool) {
            (Some(profiles), _) => profiles,
            (None, Some(pool)) => Arc::new(PgProfileDirectory::new(pool.clone())),
            (None, None) => Arc::new(MemoryProfileDirectory::new()),
        };

        let change_repo =
            self.pubsub.map(|pubsub| Arc::new(ChangeRepository::new(pubsub, DEFAULT_CHANNEL_PREFIX.to_string())));

        let notifier: Arc<dyn ChangeNotifier> = match &change_repo {
            Some(repo) => Arc::new(RedisChangeNotifier::new(Arc::clone(repo), messaging, shutdown_rx.clone()).await?),
            None => Arc::new(LocalChangeNotifier::new(
                messaging.channel_capacity,
                messaging.gc_interval_secs,
                shutdown_rx.clone(),
            )),
        };

        let upload_gateway = UploadGateway::new(Arc::clone(&storage), &self.config.storage);
        let conversation_service = ConversationService::new(
            Arc::clone(&collection),
            profiles,
            notifier,
            messaging.max_message_chars,
        );
        let health_service = HealthService::new(collection, storage, change_repo, self.config.health.clone());

        Ok(App { services: ServiceContainer { upload_gateway, conversation_service }, health_service })
    }
}

/// Routes panics through tracing so they reach the structured log.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Box<dyn Any>");
        let location = panic_info.location().map(ToString::to_string).unwrap_or_default();

        tracing::error!(panic.message = %message, panic.location = %location, "Application panicked");
    }));
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
            () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }

        let _ = shutdown_tx.send(true);
    });
}
