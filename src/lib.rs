#![forbid(unsafe_code)]

//! # kalshi-core
//!
//! Connectivity and coordination substrate for a multi-exchange trading
//! platform: a jittered backoff engine, a generic connection-lifecycle
//! state machine with REST/WebSocket/scraper specializations, an RSA-PSS
//! signed REST client, a market-catalog discovery pipeline, and the
//! Redis-backed shared state (probability snapshots, subscriptions,
//! distributed locks, persistence configuration) multiple services
//! coordinate through.
//!
//! ## Quick start
//!
//! ```rust
//! use kalshi_core::backoff::{BackoffEngine, FailureKind};
//!
//! let engine = BackoffEngine::new();
//! let delay = engine.calculate_delay("kalshi-ws", FailureKind::Network, None);
//! assert!(delay > 0.0);
//! ```

pub mod backoff;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod jitter;
pub mod logging;
pub mod process_monitor;
pub mod rest_client;
pub mod session_tracker;
pub mod sleeper;
pub mod store;

pub mod prelude;

pub use error::CoreError;
