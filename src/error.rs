//! Domain error types shared by every component in this crate.
//!
//! One closed set of error kinds (spec §7), propagated by name rather than
//! by Rust type per component: every fallible operation in this crate
//! returns `Result<T, CoreError>`.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the connectivity and coordination substrate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Network, timeout, or socket-close failure. Retried under backoff;
    /// escalates to `ConnectionState::Failed` after `max_attempts`.
    #[error("transport error talking to {service}: {message}")]
    Transport { service: String, message: String },

    /// HTTP 429 from upstream. Retried with its own backoff schedule.
    #[error("rate limited by {service} (retry after {retry_after:?})")]
    RateLimit { service: String, retry_after: Option<Duration> },

    /// Signing failure or 401/403 from upstream.
    #[error("authentication failed for {service}: {message}")]
    Authentication { service: String, message: String },

    /// Missing required field, enum out of range, malformed JSON, invalid
    /// strike layout. Fatal to the operation that raised it.
    #[error("validation error in {context}: {message}")]
    Validation { context: String, message: String },

    /// Catalog pagination loop, missing markets field, empty filtered set.
    /// Fatal to the discovery call that raised it.
    #[error("discovery error: {message}")]
    Discovery { message: String },

    /// Redis connectivity failure, pipeline-result mismatch, verification
    /// miss. Fatal to the store operation.
    #[error("store error on key {key}: {message}")]
    Store { key: String, message: String },

    /// Lock held by another owner, expired between acquire/release, or a
    /// value mismatch on release. Always fatal; caller must not proceed.
    #[error("lock unavailable for {key}: {message}")]
    LockUnavailable { key: String, message: String },

    /// Required env var missing, invalid persistence setting, incompatible
    /// key material. Fatal at startup.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A lower-level error this crate doesn't classify further, preserved
    /// for `source()` chaining.
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CoreError {
    pub fn transport(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport { service: service.into(), message: message.into() }
    }

    pub fn validation(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { context: context.into(), message: message.into() }
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery { message: message.into() }
    }

    pub fn store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store { key: key.into(), message: message.into() }
    }

    pub fn lock_unavailable(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LockUnavailable { key: key.into(), message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether this error kind is one the Backoff Engine should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::RateLimit { .. } | Self::Authentication { .. }
        )
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(e: redis::RedisError) -> Self {
        CoreError::Store { key: String::new(), message: e.to_string() }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Transport {
            service: e.url().map(|u| u.to_string()).unwrap_or_default(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(CoreError::transport("x", "y").is_retryable());
        assert!(CoreError::RateLimit { service: "x".into(), retry_after: None }.is_retryable());
        assert!(!CoreError::validation("x", "y").is_retryable());
        assert!(!CoreError::discovery("x").is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let e = CoreError::store("probabilities:BTC", "hlen mismatch");
        let msg = e.to_string();
        assert!(msg.contains("probabilities:BTC"));
        assert!(msg.contains("hlen mismatch"));
    }
}
