//! `BackoffConfig` and the closed set of failure kinds (spec §3, §4.1).

use std::time::Duration;

/// Closed set of failure kinds the Backoff Engine tracks independently per
/// service. Each kind has its own default `BackoffConfig` and its own
/// `BackoffState` sequence — a service saturating retries on `RateLimit`
/// does not affect its `Network` attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Network,
    Authentication,
    RateLimit,
    WebsocketConnection,
    WebsocketMessage,
    General,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::Network,
        FailureKind::Authentication,
        FailureKind::RateLimit,
        FailureKind::WebsocketConnection,
        FailureKind::WebsocketMessage,
        FailureKind::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::Authentication => "authentication",
            FailureKind::RateLimit => "rate_limit",
            FailureKind::WebsocketConnection => "websocket_connection",
            FailureKind::WebsocketMessage => "websocket_message",
            FailureKind::General => "general",
        }
    }
}

/// Immutable per-(service, failure-kind) delay schedule configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub growth_multiplier: f64,
    /// Symmetric jitter fraction, e.g. `0.1` for ±10%.
    pub jitter_fraction: f64,
    pub degraded_multiplier: f64,
    pub max_attempts: u32,
}

impl BackoffConfig {
    /// Default schedule for `FailureKind::Network`.
    pub fn network() -> Self {
        Self {
            initial_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
            growth_multiplier: 2.0,
            jitter_fraction: 0.1,
            degraded_multiplier: 2.0,
            max_attempts: 10,
        }
    }

    /// Default schedule for `FailureKind::Authentication`. Exhausts faster
    /// than network failures per spec §7 kind 3.
    pub fn authentication() -> Self {
        Self {
            initial_delay_seconds: 2.0,
            max_delay_seconds: 30.0,
            growth_multiplier: 2.0,
            jitter_fraction: 0.1,
            degraded_multiplier: 1.5,
            max_attempts: 5,
        }
    }

    /// Default schedule for `FailureKind::RateLimit`.
    pub fn rate_limit() -> Self {
        Self {
            initial_delay_seconds: 5.0,
            max_delay_seconds: 120.0,
            growth_multiplier: 2.0,
            jitter_fraction: 0.2,
            degraded_multiplier: 1.5,
            max_attempts: 8,
        }
    }

    /// Default schedule for `FailureKind::WebsocketConnection`.
    pub fn websocket_connection() -> Self {
        Self {
            initial_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
            growth_multiplier: 2.0,
            jitter_fraction: 0.1,
            degraded_multiplier: 2.0,
            max_attempts: 15,
        }
    }

    /// Default schedule for `FailureKind::WebsocketMessage`.
    pub fn websocket_message() -> Self {
        Self {
            initial_delay_seconds: 0.5,
            max_delay_seconds: 10.0,
            growth_multiplier: 1.5,
            jitter_fraction: 0.1,
            degraded_multiplier: 1.5,
            max_attempts: 10,
        }
    }

    /// Default schedule for `FailureKind::General`.
    pub fn general() -> Self {
        Self {
            initial_delay_seconds: 1.0,
            max_delay_seconds: 30.0,
            growth_multiplier: 2.0,
            jitter_fraction: 0.1,
            degraded_multiplier: 2.0,
            max_attempts: 10,
        }
    }

    pub fn default_for(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Network => Self::network(),
            FailureKind::Authentication => Self::authentication(),
            FailureKind::RateLimit => Self::rate_limit(),
            FailureKind::WebsocketConnection => Self::websocket_connection(),
            FailureKind::WebsocketMessage => Self::websocket_message(),
            FailureKind::General => Self::general(),
        }
    }

    /// Base delay (before jitter) for a given 1-indexed attempt, per spec
    /// §4.1 step 1: `min(initial * multiplier^(attempt-1), max)`.
    pub fn base_delay(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1) as i32;
        let grown = self.initial_delay_seconds * self.growth_multiplier.powi(exponent);
        grown.min(self.max_delay_seconds)
    }
}

/// Default age after which an idle `BackoffState` is garbage-collected by
/// `cleanup_old_state`.
pub const DEFAULT_MAX_STATE_AGE: Duration = Duration::from_secs(3600);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_grows_and_caps() {
        let cfg = BackoffConfig::network();
        assert_eq!(cfg.base_delay(1), 1.0);
        assert_eq!(cfg.base_delay(2), 2.0);
        assert_eq!(cfg.base_delay(3), 4.0);
        assert_eq!(cfg.base_delay(10), 60.0); // capped
    }

    #[test]
    fn authentication_exhausts_faster_than_network() {
        assert!(BackoffConfig::authentication().max_attempts < BackoffConfig::network().max_attempts);
    }

    #[test]
    fn failure_kind_round_trips_through_str() {
        for kind in FailureKind::ALL {
            assert!(!kind.as_str().is_empty());
        }
    }
}
