//! Redis-backed shared state (spec §4.5–§4.8): probability snapshots,
//! subscription bookkeeping, distributed locks, and persistence
//! configuration, all built on a single `redis::aio::ConnectionManager`
//! handle per process (spec §5 "single Redis connection pool per process").

pub mod config;
pub mod lock;
pub mod persistence;
pub mod probability;
pub mod subscription;

pub use config::RedisConfig;
pub use lock::{acquire_context, DistributedLock, LockGuard};
pub use persistence::{PersistenceManager, PersistenceStatus, DEFAULT_SAVE_POINTS};
pub use probability::{HumanReadableRecord, ProbabilityStore};
pub use subscription::{ServiceStatus, SubscriptionStore, SUBSCRIBED_MARKETS_SET, SUBSCRIPTIONS_KEY};
