//! Backoff Engine (spec §4.1): per-(service, failure-kind) state machine
//! computing exponentially growing, jittered, network-aware delays with
//! bounded retries.

mod config;
mod engine;
mod state;

pub use config::{BackoffConfig, FailureKind, DEFAULT_MAX_STATE_AGE};
pub use engine::{BackoffEngine, BackoffStatus, NetworkHealth, NetworkHealthSource, NoopHealthSource};
pub use state::BackoffState;
