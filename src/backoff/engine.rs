//! The Backoff Engine: per-(service, failure-kind) delay computation and
//! attempt tracking (spec §4.1).
//!
//! Concurrency: all mutable state lives behind a single `Mutex`. Backoff
//! state is touched once per failure — not a hot path — so a coarse lock is
//! simpler and still satisfies "concurrent `calculate_delay` on the same
//! (service, kind) must be serialized" (spec §4.1) without the atomics
//! machinery the teacher reserves for actually-hot paths like the circuit
//! breaker.

use super::config::{BackoffConfig, FailureKind, DEFAULT_MAX_STATE_AGE};
use super::state::BackoffState;
use crate::jitter;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Result of a network-health probe, consulted by `calculate_delay` per
/// spec §4.1 step 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkHealth {
    Healthy,
    Degraded,
    Offline,
}

/// Pluggable network-health source. Production callers wire this to the
/// Health Probes component (`crate::health`); tests use `NoopHealthSource`
/// or a closure-backed fake.
pub trait NetworkHealthSource: Send + Sync + fmt::Debug {
    fn health(&self) -> NetworkHealth;
}

/// Always reports healthy — the default when no health source is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHealthSource;

impl NetworkHealthSource for NoopHealthSource {
    fn health(&self) -> NetworkHealth {
        NetworkHealth::Healthy
    }
}

/// Snapshot returned by `status()`. Never mutates engine state, even for a
/// (service, kind) pair that has never failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffStatus {
    pub attempt: u32,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<u64>,
    pub max_attempts: u32,
    pub can_retry: bool,
    pub next_delay: f64,
}

type StateKey = (String, FailureKind);

/// Per-(service, failure-kind) delay computation and attempt tracking.
///
/// Pure computation over in-memory state — no I/O, no failure modes of its
/// own (spec §4.1 "Failure semantics: none").
pub struct BackoffEngine {
    configs: HashMap<FailureKind, BackoffConfig>,
    states: Mutex<HashMap<StateKey, BackoffState>>,
    health: Arc<dyn NetworkHealthSource>,
}

impl fmt::Debug for BackoffEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffEngine").field("health", &self.health).finish()
    }
}

impl Default for BackoffEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffEngine {
    /// Build an engine with the spec's default per-kind configs and no
    /// network-health source (always healthy).
    pub fn new() -> Self {
        Self::with_health_source(Arc::new(NoopHealthSource))
    }

    pub fn with_health_source(health: Arc<dyn NetworkHealthSource>) -> Self {
        let configs = FailureKind::ALL
            .into_iter()
            .map(|kind| (kind, BackoffConfig::default_for(kind)))
            .collect();
        Self { configs, states: Mutex::new(HashMap::new()), health }
    }

    /// Override the config for one failure kind (all services share it).
    pub fn with_config(mut self, kind: FailureKind, config: BackoffConfig) -> Self {
        self.configs.insert(kind, config);
        self
    }

    fn config(&self, kind: FailureKind) -> BackoffConfig {
        self.configs.get(&kind).copied().unwrap_or_else(|| BackoffConfig::default_for(kind))
    }

    fn degraded_multiplier_if_needed(&self, config: &BackoffConfig) -> f64 {
        match self.health.health() {
            NetworkHealth::Healthy => 1.0,
            NetworkHealth::Degraded | NetworkHealth::Offline => config.degraded_multiplier,
        }
    }

    fn compute_delay(&self, config: &BackoffConfig, attempt: u32) -> f64 {
        let base = config.base_delay(attempt) * self.degraded_multiplier_if_needed(config);
        jitter::apply(base, config.jitter_fraction)
    }

    /// `calculate_delay(service, kind, attempt?)`.
    ///
    /// When `attempt` is `None`, advances state: increments `attempt_count`
    /// and `consecutive_failures`, stamps `last_failure_time`, then computes
    /// the delay for the new attempt. When `Some`, this is a read-only
    /// preview that never touches state — resolving the open question in
    /// spec §9: preview never advances retry state, under any caller.
    pub fn calculate_delay(&self, service: &str, kind: FailureKind, attempt: Option<u32>) -> f64 {
        match attempt {
            Some(a) => {
                tracing::debug!(service, kind = kind.as_str(), attempt = a, "backoff preview");
                let config = self.config(kind);
                self.compute_delay(&config, a)
            }
            None => self.advance(service, kind),
        }
    }

    fn advance(&self, service: &str, kind: FailureKind) -> f64 {
        let config = self.config(kind);
        let now = unix_seconds();
        let attempt = {
            let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
            let state = states.entry((service.to_string(), kind)).or_default();
            state.record_failure(now);
            state.attempt_count
        };
        tracing::debug!(service, kind = kind.as_str(), attempt, "backoff advance");
        self.compute_delay(&config, attempt)
    }

    /// `should_retry(service, kind)`: `attempt_count < max_attempts`. A
    /// (service, kind) with no recorded failures has never been denied a
    /// retry.
    pub fn should_retry(&self, service: &str, kind: FailureKind) -> bool {
        let max_attempts = self.config(kind).max_attempts;
        let attempt = self.attempt_count(service, kind);
        attempt < max_attempts
    }

    fn attempt_count(&self, service: &str, kind: FailureKind) -> u32 {
        let states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        states.get(&(service.to_string(), kind)).map(|s| s.attempt_count).unwrap_or(0)
    }

    /// `reset(service, kind?)`. With a kind, clears only that kind's state
    /// for the service; without, clears every kind.
    pub fn reset(&self, service: &str, kind: Option<FailureKind>) {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        match kind {
            Some(k) => {
                states.remove(&(service.to_string(), k));
            }
            None => {
                states.retain(|(svc, _), _| svc != service);
            }
        }
    }

    /// Read-only status snapshot; never creates or mutates stored state.
    pub fn status(&self, service: &str, kind: FailureKind) -> BackoffStatus {
        let config = self.config(kind);
        let states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let existing = states.get(&(service.to_string(), kind)).copied().unwrap_or_default();
        let next_attempt = existing.attempt_count + 1;
        BackoffStatus {
            attempt: existing.attempt_count,
            consecutive_failures: existing.consecutive_failures,
            last_failure_time: existing.last_failure_time,
            max_attempts: config.max_attempts,
            can_retry: existing.attempt_count < config.max_attempts,
            next_delay: self.compute_delay(&config, next_attempt),
        }
    }

    /// Remove services whose every recorded kind's `last_failure_time`
    /// predates `now - max_age`.
    pub fn cleanup_old_state(&self, max_age: Duration) {
        let now = unix_seconds();
        let max_age_secs = max_age.as_secs();
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());

        let mut per_service: HashMap<String, Vec<bool>> = HashMap::new();
        for ((service, _), state) in states.iter() {
            per_service
                .entry(service.clone())
                .or_default()
                .push(state.is_stale(now, max_age_secs));
        }

        let stale_services: Vec<String> = per_service
            .into_iter()
            .filter(|(_, staleness)| !staleness.is_empty() && staleness.iter().all(|&s| s))
            .map(|(service, _)| service)
            .collect();

        states.retain(|(svc, _), _| !stale_services.contains(svc));
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct FixedHealth(StdMutex<NetworkHealth>);

    impl NetworkHealthSource for FixedHealth {
        fn health(&self) -> NetworkHealth {
            *self.0.lock().unwrap()
        }
    }

    fn test_config() -> BackoffConfig {
        BackoffConfig {
            initial_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
            growth_multiplier: 2.0,
            jitter_fraction: 0.1,
            degraded_multiplier: 2.0,
            max_attempts: 5,
        }
    }

    #[test]
    fn delay_monotonicity_attempt_count_increases_by_one() {
        let engine = BackoffEngine::new().with_config(FailureKind::Network, test_config());
        for expected in 1..=4u32 {
            engine.calculate_delay("svc", FailureKind::Network, None);
            assert_eq!(engine.attempt_count("svc", FailureKind::Network), expected);
        }
    }

    #[test]
    fn delay_bound_respects_max_and_minimum() {
        let engine = BackoffEngine::new().with_config(FailureKind::Network, test_config());
        for _ in 0..20 {
            let d = engine.calculate_delay("svc", FailureKind::Network, None);
            assert!(d >= 0.1);
        }
        // After many attempts, base should be capped at max_delay (60s) before jitter.
        let status = engine.status("svc", FailureKind::Network);
        assert!(status.next_delay <= 60.0 * 1.1 + 1e-9);
    }

    #[test]
    fn reset_idempotence() {
        let engine = BackoffEngine::new().with_config(FailureKind::Network, test_config());
        engine.calculate_delay("svc", FailureKind::Network, None);
        engine.reset("svc", Some(FailureKind::Network));
        let after_one = engine.status("svc", FailureKind::Network);
        engine.reset("svc", Some(FailureKind::Network));
        let after_two = engine.status("svc", FailureKind::Network);
        assert_eq!(after_one, after_two);
        assert_eq!(after_one.attempt, 0);
    }

    #[test]
    fn reset_without_kind_clears_all_kinds_for_service() {
        let engine = BackoffEngine::new();
        engine.calculate_delay("svc", FailureKind::Network, None);
        engine.calculate_delay("svc", FailureKind::RateLimit, None);
        engine.reset("svc", None);
        assert_eq!(engine.status("svc", FailureKind::Network).attempt, 0);
        assert_eq!(engine.status("svc", FailureKind::RateLimit).attempt, 0);
    }

    #[test]
    fn should_retry_false_once_max_attempts_reached() {
        let engine = BackoffEngine::new().with_config(FailureKind::Network, test_config());
        for _ in 0..5 {
            engine.calculate_delay("svc", FailureKind::Network, None);
        }
        assert!(!engine.should_retry("svc", FailureKind::Network));
    }

    #[test]
    fn degraded_network_multiplies_base_delay() {
        let health = Arc::new(FixedHealth(StdMutex::new(NetworkHealth::Degraded)));
        let engine = BackoffEngine::with_health_source(health.clone())
            .with_config(FailureKind::Network, BackoffConfig { jitter_fraction: 0.0, ..test_config() });
        let delay = engine.calculate_delay("svc", FailureKind::Network, Some(1));
        // base(1) = 1.0 * degraded_multiplier(2.0) = 2.0, no jitter.
        assert_eq!(delay, 2.0);
    }

    #[test]
    fn scenario_preview_does_not_advance_state() {
        // Spec §8 scenario 1.
        let engine = BackoffEngine::new().with_config(
            FailureKind::Network,
            BackoffConfig {
                initial_delay_seconds: 1.0,
                max_delay_seconds: 60.0,
                growth_multiplier: 2.0,
                jitter_fraction: 0.1,
                degraded_multiplier: 2.0,
                max_attempts: 5,
            },
        );

        assert!(engine.should_retry("svc", FailureKind::Network));

        let v1 = engine.calculate_delay("svc", FailureKind::Network, None);
        assert!((0.9..=1.1).contains(&v1));
        assert_eq!(engine.attempt_count("svc", FailureKind::Network), 1);

        let preview = engine.calculate_delay("svc", FailureKind::Network, Some(2));
        assert!((1.8..=2.2).contains(&preview));
        assert_eq!(engine.attempt_count("svc", FailureKind::Network), 1, "preview must not advance state");

        let v2 = engine.calculate_delay("svc", FailureKind::Network, None);
        assert!((1.8..=2.2).contains(&v2));
        assert_eq!(engine.attempt_count("svc", FailureKind::Network), 2);
    }

    #[test]
    fn cleanup_removes_only_services_stale_in_every_kind() {
        let engine = BackoffEngine::new();
        engine.calculate_delay("stale-svc", FailureKind::Network, None);
        engine.calculate_delay("mixed-svc", FailureKind::Network, None);

        // Manually age "stale-svc" past the threshold by rewriting its state.
        {
            let mut states = engine.states.lock().unwrap();
            if let Some(s) = states.get_mut(&("stale-svc".to_string(), FailureKind::Network)) {
                s.last_failure_time = Some(0);
            }
        }

        engine.cleanup_old_state(Duration::from_secs(1));

        assert_eq!(engine.status("stale-svc", FailureKind::Network).attempt, 0);
        assert_eq!(engine.status("mixed-svc", FailureKind::Network).attempt, 1);
    }

    #[test]
    fn default_max_state_age_is_one_hour() {
        assert_eq!(DEFAULT_MAX_STATE_AGE, Duration::from_secs(3600));
    }
}
