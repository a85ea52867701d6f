//! Jitter for the Backoff Engine.
//!
//! The spec's jitter is a single fraction-bounded uniform draw around the
//! base delay (`±jitter_fraction · base`), not the AWS-style Full/Equal/
//! Decorrelated family a generic retry library would offer — grounded here
//! because one config field (`jitter_fraction`) drives it per §4.1 step 3.

use rand::Rng;
use std::time::Duration;

/// Minimum delay the backoff engine will ever return, per spec §4.1 step 3.
pub const MIN_DELAY_SECONDS: f64 = 0.1;

/// Apply `±fraction · base` jitter to a base delay (in seconds), clamped to
/// `MIN_DELAY_SECONDS`.
pub fn apply(base_seconds: f64, fraction: f64) -> f64 {
    apply_with_rng(base_seconds, fraction, &mut rand::rng())
}

/// Same as [`apply`] but with an injected RNG, for deterministic tests.
pub fn apply_with_rng<R: Rng>(base_seconds: f64, fraction: f64, rng: &mut R) -> f64 {
    let spread = fraction.abs() * base_seconds;
    let delta = if spread > 0.0 { rng.random_range(-spread..=spread) } else { 0.0 };
    (base_seconds + delta).max(MIN_DELAY_SECONDS)
}

/// Convenience wrapper operating on [`Duration`], used outside the backoff
/// engine's own float arithmetic (e.g. connection-lifecycle reconnect delays
/// expressed as `Duration`).
pub fn apply_duration(base: Duration, fraction: f64) -> Duration {
    Duration::from_secs_f64(apply(base.as_secs_f64(), fraction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn jitter_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let v = apply_with_rng(10.0, 0.1, &mut rng);
            assert!(v >= 9.0 - 1e-9 && v <= 11.0 + 1e-9, "out of range: {v}");
        }
    }

    #[test]
    fn jitter_never_below_minimum() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let v = apply_with_rng(0.05, 1.0, &mut rng);
            assert!(v >= MIN_DELAY_SECONDS);
        }
    }

    #[test]
    fn zero_fraction_is_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(apply_with_rng(5.0, 0.0, &mut rng), 5.0);
    }

    #[test]
    fn scenario_backoff_preview_range() {
        // Matches spec §8 scenario 1: initial=1.0, jitter=0.1 → v1 in [0.9, 1.1]
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..200 {
            let v = apply_with_rng(1.0, 0.1, &mut rng);
            assert!((0.9..=1.1).contains(&v));
        }
    }
}
