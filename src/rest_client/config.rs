//! Exchange REST client configuration (spec §4.3).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RestClientConfig {
    pub base_url: String,
    pub access_key: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base_seconds: f64,
    pub backoff_max_seconds: f64,
}

impl RestClientConfig {
    pub fn new(base_url: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_key: access_key.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base_seconds: 1.0,
            backoff_max_seconds: 30.0,
        }
    }
}
