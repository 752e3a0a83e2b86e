//! # Mesh Configuration
//!
//! One configuration tree shared by every service role. Defaults are the
//! production budgets; `from_env` overlays `MESH_*` variables on top.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `MESH_SERVICE` | `service` |
//! | `MESH_REDIS_URL` | `store.redis_url` |
//! | `MESH_STORE_TIMEOUT` | `store.op_timeout` (humantime, e.g. `500ms`) |
//! | `MESH_BUS_TIMEOUT` | `bus.op_timeout` |
//! | `MESH_BUS_MAX_ATTEMPTS` | `bus.max_attempts` |
//! | `MESH_KAFKA_BROKERS` | `bus.kafka_brokers` (comma-separated `host:port`) |
//! | `MESH_SEARCH_INVALIDATES` | `cache.search_invalidates` (comma-separated prefixes) |
//! | `MESH_MEDIA_INVALIDATES` | `cache.media_invalidates` |
//! | `MESH_HTTP_PORT` | `http.port` |

use serde::{Deserialize, Serialize};
use shared_bus::SubscriptionConfig;
use sm_01_rate_limiter::RoutePolicy;
use sm_03_consistency::coordinator::{media, search};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid rate limit '{scope}': {reason}")]
    InvalidRateLimit { scope: String, reason: String },

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid bus setting: {0}")]
    InvalidBus(String),

    #[error("invalid cache setting: {0}")]
    InvalidCache(String),

    #[error("unknown service role '{0}'")]
    UnknownRole(String),

    #[error("cannot parse {var}={value}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which services this process hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceRole {
    PostService,
    SearchService,
    MediaService,
    /// Every service in one process.
    All,
}

impl ServiceRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PostService => "post-service",
            Self::SearchService => "search-service",
            Self::MediaService => "media-service",
            Self::All => "all",
        }
    }

    #[must_use]
    pub fn hosts_posts(self) -> bool {
        matches!(self, Self::PostService | Self::All)
    }

    #[must_use]
    pub fn hosts_search(self) -> bool {
        matches!(self, Self::SearchService | Self::All)
    }

    #[must_use]
    pub fn hosts_media(self) -> bool {
        matches!(self, Self::MediaService | Self::All)
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post-service" | "post" => Ok(Self::PostService),
            "search-service" | "search" => Ok(Self::SearchService),
            "media-service" | "media" => Ok(Self::MediaService),
            "all" => Ok(Self::All),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

/// Complete mesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub service: ServiceRole,
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub cache: CacheConfig,
    pub rate_limits: RateLimitConfig,
    pub http: HttpConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            service: ServiceRole::All,
            store: StoreConfig::default(),
            bus: BusConfig::default(),
            cache: CacheConfig::default(),
            rate_limits: RateLimitConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl MeshConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each `MESH_*`
    /// variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(role) = lookup("MESH_SERVICE") {
            config.service = role.parse()?;
        }
        if let Some(url) = lookup("MESH_REDIS_URL") {
            config.store.redis_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(value) = lookup("MESH_STORE_TIMEOUT") {
            config.store.op_timeout = parse_duration("MESH_STORE_TIMEOUT", value)?;
        }
        if let Some(value) = lookup("MESH_BUS_TIMEOUT") {
            config.bus.op_timeout = parse_duration("MESH_BUS_TIMEOUT", value)?;
        }
        if let Some(value) = lookup("MESH_BUS_MAX_ATTEMPTS") {
            config.bus.max_attempts = parse_number("MESH_BUS_MAX_ATTEMPTS", value)?;
        }
        if let Some(brokers) = lookup("MESH_KAFKA_BROKERS") {
            config.bus.kafka_brokers = Some(brokers).filter(|b| !b.is_empty());
        }
        if let Some(value) = lookup("MESH_SEARCH_INVALIDATES") {
            config.cache.search_invalidates = parse_list(&value);
        }
        if let Some(value) = lookup("MESH_MEDIA_INVALIDATES") {
            config.cache.media_invalidates = parse_list(&value);
        }
        if let Some(value) = lookup("MESH_HTTP_PORT") {
            config.http.port = parse_number("MESH_HTTP_PORT", value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for policy in self.rate_limits.policies() {
            policy
                .validate()
                .map_err(|e| ConfigError::InvalidRateLimit {
                    scope: policy.scope.clone(),
                    reason: e.to_string(),
                })?;
        }

        if self.store.op_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "store op_timeout cannot be 0".into(),
            ));
        }
        if self.bus.op_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "bus op_timeout cannot be 0".into(),
            ));
        }

        if self.bus.max_attempts == 0 {
            return Err(ConfigError::InvalidBus("max_attempts cannot be 0".into()));
        }
        if self.bus.retention == 0 {
            return Err(ConfigError::InvalidBus("retention cannot be 0".into()));
        }

        // An empty prefix would match, and drop, every key in the store.
        for (name, prefixes) in [
            ("search_invalidates", &self.cache.search_invalidates),
            ("media_invalidates", &self.cache.media_invalidates),
        ] {
            if prefixes.iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::InvalidCache(format!(
                    "{name} cannot contain an empty prefix"
                )));
            }
        }

        Ok(())
    }
}

fn parse_duration(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(&value).map_err(|e| ConfigError::InvalidEnv {
        var,
        reason: e.to_string(),
        value,
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(|p| p.trim().to_string()).collect()
}

fn parse_number<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        var,
        reason: e.to_string(),
        value,
    })
}

/// Shared store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis URL. Without it (or without the `redis` feature) the store
    /// lives in process memory.
    pub redis_url: Option<String>,
    /// Bound on every store round-trip.
    #[serde(with = "humantime_serde")]
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            op_timeout: shared_store::DEFAULT_OP_TIMEOUT,
        }
    }
}

/// Event bus delivery policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Deliveries attempted before a message is dead-lettered.
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub op_timeout: Duration,
    /// Messages kept per topic for queues bound after publish.
    pub retention: usize,
    /// Base redelivery delay, multiplied by the attempt number.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// Kafka bootstrap servers. Without them (or without the `kafka`
    /// feature) the bus lives in process memory and split roles cannot
    /// reach each other.
    pub kafka_brokers: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_attempts: shared_bus::DEFAULT_MAX_ATTEMPTS,
            op_timeout: shared_bus::DEFAULT_OP_TIMEOUT,
            retention: shared_bus::DEFAULT_RETENTION,
            retry_backoff: shared_bus::DEFAULT_RETRY_BACKOFF,
            kafka_brokers: None,
        }
    }
}

impl BusConfig {
    #[must_use]
    pub fn subscription(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            max_attempts: self.max_attempts,
            retry_backoff: self.retry_backoff,
            op_timeout: self.op_timeout,
        }
    }
}

/// TTLs of each cached view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `posts:<page>:<limit>`
    #[serde(with = "humantime_serde")]
    pub post_list_ttl: Duration,
    /// `posts:<postId>`
    #[serde(with = "humantime_serde")]
    pub single_post_ttl: Duration,
    /// `search:<query>`
    #[serde(with = "humantime_serde")]
    pub search_ttl: Duration,
    /// `media:all`
    #[serde(with = "humantime_serde")]
    pub media_list_ttl: Duration,
    /// Prefixes dropped after the search consumer applies an event.
    pub search_invalidates: Vec<String>,
    /// Prefixes dropped after the media consumer cleans up a post.
    pub media_invalidates: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            post_list_ttl: Duration::from_secs(300),
            single_post_ttl: Duration::from_secs(3600),
            search_ttl: Duration::from_secs(180),
            media_list_ttl: Duration::from_secs(300),
            search_invalidates: search::default_prefixes(),
            media_invalidates: media::default_prefixes(),
        }
    }
}

/// Route budgets.
///
/// `gateway` and the `identity_*` policies key on the client address; the
/// rest key on the authenticated user when there is one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub gateway: RoutePolicy,
    pub identity_global: RoutePolicy,
    pub identity_sensitive: RoutePolicy,
    pub post_create: RoutePolicy,
    pub post_delete: RoutePolicy,
    pub post_get_all: RoutePolicy,
    pub post_get: RoutePolicy,
    pub media_upload: RoutePolicy,
    pub search_query: RoutePolicy,
}

const MINUTE: Duration = Duration::from_secs(60);
const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            gateway: RoutePolicy::new("gateway", 100, FIFTEEN_MINUTES),
            identity_global: RoutePolicy::new("identity:global", 10, Duration::from_secs(1)),
            identity_sensitive: RoutePolicy::new("identity:sensitive", 20, FIFTEEN_MINUTES),
            post_create: RoutePolicy::new("post:create", 2, MINUTE),
            post_delete: RoutePolicy::new("post:delete", 10, MINUTE),
            post_get_all: RoutePolicy::new("post:getall", 30, MINUTE),
            post_get: RoutePolicy::new("post:get", 60, MINUTE),
            media_upload: RoutePolicy::new("media:upload", 5, MINUTE),
            search_query: RoutePolicy::new("search:query", 60, MINUTE),
        }
    }
}

impl RateLimitConfig {
    /// Every configured policy.
    #[must_use]
    pub fn policies(&self) -> [&RoutePolicy; 9] {
        [
            &self.gateway,
            &self.identity_global,
            &self.identity_sensitive,
            &self.post_create,
            &self.post_delete,
            &self.post_get_all,
            &self.post_get,
            &self.media_upload,
            &self.search_query,
        ]
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
