//! Health Probes (spec §4.1 table, §4.2): protocol-specific liveness checks
//! returning a single uniform result shape.

use crate::backoff::{NetworkHealth, NetworkHealthSource};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Uniform result of any protocol-specific health check (spec §3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub details: HashMap<String, JsonValue>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self { healthy: true, details: HashMap::new(), error: None }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self { healthy: false, details: HashMap::new(), error: Some(error.into()) }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Protocol-agnostic liveness check, implemented by each Connection
/// Lifecycle specialization (REST GET, WebSocket ping/pong, scraper URL
/// fetch + validators).
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check_health(&self) -> HealthCheckResult;
}

/// Bridges repeated `HealthCheckResult`s into the `NetworkHealthSource` the
/// Backoff Engine consults for its degraded multiplier (spec §4.1 step 2).
///
/// Degraded after `degraded_threshold` consecutive unhealthy checks; offline
/// after `offline_threshold`. Healthy resets the counter to zero.
#[derive(Debug)]
pub struct HealthTrackingSource {
    consecutive_unhealthy: AtomicU32,
    degraded_threshold: u32,
    offline_threshold: u32,
}

impl HealthTrackingSource {
    pub fn new(degraded_threshold: u32, offline_threshold: u32) -> Self {
        Self {
            consecutive_unhealthy: AtomicU32::new(0),
            degraded_threshold,
            offline_threshold,
        }
    }

    pub fn record(&self, result: &HealthCheckResult) {
        if result.healthy {
            self.consecutive_unhealthy.store(0, Ordering::SeqCst);
        } else {
            self.consecutive_unhealthy.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Default for HealthTrackingSource {
    fn default() -> Self {
        Self::new(2, 5)
    }
}

impl NetworkHealthSource for HealthTrackingSource {
    fn health(&self) -> NetworkHealth {
        let n = self.consecutive_unhealthy.load(Ordering::SeqCst);
        if n >= self.offline_threshold {
            NetworkHealth::Offline
        } else if n >= self.degraded_threshold {
            NetworkHealth::Degraded
        } else {
            NetworkHealth::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_checks_keep_source_healthy() {
        let source = HealthTrackingSource::default();
        source.record(&HealthCheckResult::healthy());
        assert_eq!(source.health(), NetworkHealth::Healthy);
    }

    #[test]
    fn repeated_failures_escalate_to_degraded_then_offline() {
        let source = HealthTrackingSource::new(2, 4);
        source.record(&HealthCheckResult::unhealthy("x"));
        assert_eq!(source.health(), NetworkHealth::Healthy);
        source.record(&HealthCheckResult::unhealthy("x"));
        assert_eq!(source.health(), NetworkHealth::Degraded);
        source.record(&HealthCheckResult::unhealthy("x"));
        source.record(&HealthCheckResult::unhealthy("x"));
        assert_eq!(source.health(), NetworkHealth::Offline);
    }

    #[test]
    fn a_single_healthy_check_resets_after_failures() {
        let source = HealthTrackingSource::new(2, 4);
        source.record(&HealthCheckResult::unhealthy("x"));
        source.record(&HealthCheckResult::unhealthy("x"));
        source.record(&HealthCheckResult::healthy());
        assert_eq!(source.health(), NetworkHealth::Healthy);
    }

    #[test]
    fn health_check_result_builder() {
        let r = HealthCheckResult::healthy().with_detail("latency_ms", 12);
        assert!(r.healthy);
        assert_eq!(r.details.get("latency_ms").unwrap(), &JsonValue::from(12));
    }
}
