//! Redis connection configuration (spec §4.5-4.8), grounded on
//! `original_source/redis_protocol/connection_pool_core.py`'s
//! `UNIFIED_REDIS_CONFIG`.

use std::time::Duration;

/// Connection parameters for the shared Redis instance backing the
/// Probability Store, Subscription Store, Distributed Lock, and
/// Persistence Manager.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    pub use_ssl: bool,
    /// Upper bound advertised to operators; the `redis` crate's
    /// `ConnectionManager` multiplexes a single connection rather than
    /// pooling N discrete ones, so this is informational (see DESIGN.md).
    pub max_connections: u32,
    pub socket_connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            use_ssl: false,
            max_connections: 120,
            socket_connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        let scheme = if self.use_ssl { "rediss" } else { "redis" };
        match &self.password {
            Some(password) => format!("{scheme}://:{password}@{}:{}/{}", self.host, self.port, self.db),
            None => format!("{scheme}://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}
