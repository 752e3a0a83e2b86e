//! # Service Runtime
//!
//! Builds every shared component once and injects it where needed:
//!
//! ```text
//!            ┌──────────── SharedStore (TimeoutStore) ────────────┐
//!            │                     │                              │
//!       RateLimiter           CacheManager                IdempotencyGuard
//!            │                     │                              │
//!      RateLimitLayer    Post/Search/Media services    Search/Media coordinators
//!            │                     │                              ↑
//!            └────── axum Router ──┘── BusPublisher ──→ Broker ──→ Subscriber
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Connect the shared store and check it answers
//! 3. Bind durable queues and spawn one consumer task per subscription
//!    (any failure aborts startup)
//! 4. Serve HTTP until shutdown is requested
//! 5. Stop consumers after their in-flight delivery settles

use axum::Router;
use parking_lot::Mutex;
use shared_bus::{
    queue_name, Broker, BusPublisher, EventHandler, InMemoryBroker, Subscriber, Subscription,
};
use shared_store::{InMemoryStore, SharedStore, TimeoutStore};
use shared_types::EventType;
use sm_01_rate_limiter::{RateLimiter, RateLimiterApi};
use sm_02_cache_manager::CacheManager;
use sm_03_consistency::{
    IdempotencyGuard, InMemoryMediaRepository, InMemoryObjectStorage, InMemorySearchIndex,
    MediaCleanupCoordinator, MediaRepository, ObjectStorage, SearchIndex, SearchIndexCoordinator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::adapters::InMemoryPostRepository;
use crate::config::MeshConfig;
use crate::error::RuntimeError;
use crate::http::{build_router, ApiServices};
use crate::ports::PostRepository;
use crate::services::{MediaService, PostService, SearchService};

/// Idempotency namespace and queue prefix of the search consumer.
pub const SEARCH_SERVICE: &str = "search-service";
/// Idempotency namespace and queue prefix of the media consumer.
pub const MEDIA_SERVICE: &str = "media-service";

/// System-of-record stores owned by the hosted services.
#[derive(Clone)]
pub struct Repositories {
    pub posts: Arc<dyn PostRepository>,
    pub search_index: Arc<dyn SearchIndex>,
    pub media: Arc<dyn MediaRepository>,
    pub objects: Arc<dyn ObjectStorage>,
}

impl Repositories {
    /// Process-local stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            posts: Arc::new(InMemoryPostRepository::new()),
            search_index: Arc::new(InMemorySearchIndex::new()),
            media: Arc::new(InMemoryMediaRepository::new()),
            objects: Arc::new(InMemoryObjectStorage::new()),
        }
    }
}

/// The main runtime orchestrating the hosted services.
pub struct ServiceRuntime {
    config: MeshConfig,
    store: Arc<dyn SharedStore>,
    broker: Arc<dyn Broker>,
    limiter: Arc<dyn RateLimiterApi>,
    repositories: Repositories,
    services: ApiServices,
    subscriptions: Mutex<Vec<Subscription>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ServiceRuntime {
    /// Connect to the configured backends.
    ///
    /// Uses Redis when `store.redis_url` is set and the `redis` feature is
    /// enabled, and Kafka when `bus.kafka_brokers` is set and the `kafka`
    /// feature is enabled. Each falls back to process memory otherwise.
    pub async fn connect(config: MeshConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let store = connect_store(&config).await?;
        let broker = connect_broker(&config)?;
        Self::with_backends(config, store, broker, Repositories::in_memory()).await
    }

    /// Assemble the runtime over explicit backends.
    pub async fn with_backends(
        config: MeshConfig,
        store: Arc<dyn SharedStore>,
        broker: Arc<dyn Broker>,
        repositories: Repositories,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let store: Arc<dyn SharedStore> = Arc::new(TimeoutStore::new(store, config.store.op_timeout));
        store.ping().await?;

        let cache = CacheManager::new(Arc::clone(&store));
        let limiter: Arc<dyn RateLimiterApi> = Arc::new(RateLimiter::new(Arc::clone(&store)));
        let publisher = Arc::new(BusPublisher::with_timeout(
            Arc::clone(&broker),
            config.bus.op_timeout,
        ));

        let role = config.service;
        let services = ApiServices {
            posts: role.hosts_posts().then(|| {
                Arc::new(PostService::new(
                    Arc::clone(&repositories.posts),
                    cache.clone(),
                    publisher.clone(),
                    config.cache.post_list_ttl,
                    config.cache.single_post_ttl,
                ))
            }),
            search: role.hosts_search().then(|| {
                Arc::new(SearchService::new(
                    Arc::clone(&repositories.search_index),
                    cache.clone(),
                    config.cache.search_ttl,
                ))
            }),
            media: role.hosts_media().then(|| {
                Arc::new(MediaService::new(
                    Arc::clone(&repositories.media),
                    cache.clone(),
                    config.cache.media_list_ttl,
                ))
            }),
        };

        let (shutdown_tx, _) = watch::channel(false);
        info!(service = %role, "Service runtime assembled");

        Ok(Self {
            config,
            store,
            broker,
            limiter,
            repositories,
            services,
            subscriptions: Mutex::new(Vec::new()),
            shutdown_tx,
        })
    }

    /// Bind the durable queues of the hosted consumers and start consuming.
    ///
    /// A consuming service must not run without its consumers, so any
    /// subscription failure stops the ones already started and is returned.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let subscriber = Subscriber::new(Arc::clone(&self.broker), self.config.bus.subscription());
        let mut started = Vec::new();

        for (service, topic, handler) in self.consumers() {
            let queue = queue_name(service, topic.topic());
            match subscriber.subscribe(topic.topic(), &queue, handler).await {
                Ok(subscription) => started.push(subscription),
                Err(e) => {
                    error!(queue = %queue, error = %e, "Failed to attach consumer");
                    for subscription in started {
                        subscription.shutdown().await;
                    }
                    return Err(e.into());
                }
            }
        }

        info!(consumers = started.len(), "Consumers attached");
        self.subscriptions.lock().extend(started);
        Ok(())
    }

    /// `(service, topic, handler)` for every consumer this role hosts.
    fn consumers(&self) -> Vec<(&'static str, EventType, Arc<dyn EventHandler>)> {
        let role = self.config.service;
        let cache = CacheManager::new(Arc::clone(&self.store));
        let mut consumers: Vec<(&'static str, EventType, Arc<dyn EventHandler>)> = Vec::new();

        if role.hosts_search() {
            let search: Arc<dyn EventHandler> = Arc::new(SearchIndexCoordinator::new(
                Arc::clone(&self.repositories.search_index),
                cache.clone(),
                IdempotencyGuard::new(Arc::clone(&self.store), SEARCH_SERVICE),
            )
            .with_invalidated_prefixes(self.config.cache.search_invalidates.clone()));
            consumers.push((SEARCH_SERVICE, EventType::PostCreated, Arc::clone(&search)));
            consumers.push((SEARCH_SERVICE, EventType::PostDeleted, search));
        }

        if role.hosts_media() {
            let media: Arc<dyn EventHandler> = Arc::new(MediaCleanupCoordinator::new(
                Arc::clone(&self.repositories.media),
                Arc::clone(&self.repositories.objects),
                cache,
                IdempotencyGuard::new(Arc::clone(&self.store), MEDIA_SERVICE),
            )
            .with_invalidated_prefixes(self.config.cache.media_invalidates.clone()));
            consumers.push((MEDIA_SERVICE, EventType::PostDeleted, media));
        }

        consumers
    }

    /// The HTTP router for the hosted services.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(
            self.config.service,
            &self.services,
            Arc::clone(&self.limiter),
            &self.config.rate_limits,
        )
    }

    /// Serve HTTP on `listener` until [`request_shutdown`](Self::request_shutdown).
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RuntimeError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let app = self.router();
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await?;
        Ok(())
    }

    /// Ask the HTTP server to stop accepting requests.
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Shut the runtime down gracefully.
    ///
    /// ## Shutdown Sequence
    ///
    /// 1. Signal the HTTP server
    /// 2. Stop every consumer after its in-flight delivery settles
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.request_shutdown();

        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in subscriptions {
            let queue = subscription.queue().to_string();
            subscription.shutdown().await;
            info!(queue = %queue, "Consumer stopped");
        }

        info!("Shutdown complete");
    }

    #[must_use]
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    #[must_use]
    pub fn services(&self) -> &ApiServices {
        &self.services
    }

    #[must_use]
    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    /// Queues with a running consumer.
    #[must_use]
    pub fn consumer_queues(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .iter()
            .filter(|s| s.is_running())
            .map(|s| s.queue().to_string())
            .collect()
    }
}

#[cfg(feature = "redis")]
async fn connect_store(config: &MeshConfig) -> Result<Arc<dyn SharedStore>, RuntimeError> {
    match &config.store.redis_url {
        Some(url) => Ok(Arc::new(shared_store::RedisStore::connect(url).await?)),
        None => {
            warn!("No MESH_REDIS_URL set, using a process-local store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_store(config: &MeshConfig) -> Result<Arc<dyn SharedStore>, RuntimeError> {
    if config.store.redis_url.is_some() {
        warn!("MESH_REDIS_URL ignored: built without the `redis` feature");
    }
    Ok(Arc::new(InMemoryStore::new()))
}

#[cfg(feature = "kafka")]
fn connect_broker(config: &MeshConfig) -> Result<Arc<dyn Broker>, RuntimeError> {
    match &config.bus.kafka_brokers {
        Some(brokers) => Ok(Arc::new(shared_bus::KafkaBroker::connect(
            brokers,
            config.bus.op_timeout,
        )?)),
        None => {
            warn!("No MESH_KAFKA_BROKERS set, using a process-local bus");
            Ok(Arc::new(InMemoryBroker::with_retention(config.bus.retention)))
        }
    }
}

#[cfg(not(feature = "kafka"))]
fn connect_broker(config: &MeshConfig) -> Result<Arc<dyn Broker>, RuntimeError> {
    if config.bus.kafka_brokers.is_some() {
        warn!("MESH_KAFKA_BROKERS ignored: built without the `kafka` feature");
    }
    Ok(Arc::new(InMemoryBroker::with_retention(config.bus.retention)))
}
