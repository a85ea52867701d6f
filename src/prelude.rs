//! Convenient re-exports for the types most callers wire up directly.
pub use crate::{
    backoff::{BackoffConfig, BackoffEngine, BackoffStatus, FailureKind},
    catalog::{discover_mutually_exclusive_markets, CatalogConfig, Category, DiscoveredEvent, DiscoveredMarket},
    config::Settings,
    connection::{ConnectionHandler, ConnectionLifecycle, ConnectionState, LifecycleConfig},
    error::CoreError,
    health::HealthCheckResult,
    rest_client::{KalshiClient, RestClientConfig},
    store::{
        DistributedLock, LockGuard, PersistenceManager, ProbabilityStore, RedisConfig, SubscriptionStore,
    },
};
