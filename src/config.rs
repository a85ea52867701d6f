//! Ambient configuration (spec §6 "Config env vars"): one flat
//! environment-backed `Settings` struct, populated via `envy` — the
//! lightest-weight crate compatible with `serde::Deserialize` for this
//! shape of configuration surface (flat env vars, not layered files).

use crate::error::CoreError;
use serde::Deserialize;

fn default_connection_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_reconnection_initial_delay() -> f64 {
    1.0
}
fn default_reconnection_max_delay() -> f64 {
    60.0
}
fn default_reconnection_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_consecutive_failures() -> u32 {
    5
}
fn default_health_check_interval() -> u64 {
    10
}
fn default_subscription_timeout() -> u64 {
    10
}
fn default_service_runtime_dir() -> String {
    "/tmp".to_string()
}
fn default_session_tracking_log_level() -> String {
    "INFO".to_string()
}

/// Flat process configuration, deserialized directly from environment
/// variables (spec §6). Fields mirror the spec's exhaustive env var list;
/// everything else each component needs is passed in explicitly by its
/// caller rather than read from the environment a second time.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_reconnection_initial_delay")]
    pub reconnection_initial_delay_seconds: f64,
    #[serde(default = "default_reconnection_max_delay")]
    pub reconnection_max_delay_seconds: f64,
    #[serde(default = "default_reconnection_backoff_multiplier")]
    pub reconnection_backoff_multiplier: f64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    #[serde(default = "default_subscription_timeout")]
    pub subscription_timeout_seconds: u64,

    #[serde(default = "default_service_runtime_dir")]
    pub service_runtime_dir: String,
    #[serde(default)]
    pub managed_by_monitor: bool,
    #[serde(default = "default_session_tracking_log_level")]
    pub session_tracking_log_level: String,

    pub redis_host: Option<String>,
    pub redis_port: Option<u16>,
    pub redis_db: Option<i64>,
    pub redis_password: Option<String>,
    #[serde(default)]
    pub redis_ssl: bool,
}

impl Settings {
    /// Loads settings from the process environment. A missing or
    /// unparsable value for any field is a fatal configuration error
    /// (spec §7 kind 8) — callers exit nonzero rather than run with
    /// guessed values for anything the spec requires to be explicit.
    pub fn from_env() -> Result<Self, CoreError> {
        envy::from_env::<Settings>().map_err(|e| CoreError::configuration(format!("failed to load settings from environment: {e}")))
    }

    pub fn lock_file_path(&self, service_name: &str) -> String {
        format!("{}/{service_name}.lock", self.service_runtime_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_file_path_joins_runtime_dir_and_service_name() {
        let settings = Settings {
            connection_timeout_seconds: default_connection_timeout(),
            request_timeout_seconds: default_request_timeout(),
            reconnection_initial_delay_seconds: default_reconnection_initial_delay(),
            reconnection_max_delay_seconds: default_reconnection_max_delay(),
            reconnection_backoff_multiplier: default_reconnection_backoff_multiplier(),
            max_consecutive_failures: default_max_consecutive_failures(),
            health_check_interval_seconds: default_health_check_interval(),
            subscription_timeout_seconds: default_subscription_timeout(),
            service_runtime_dir: "/var/run/kalshi".to_string(),
            managed_by_monitor: false,
            session_tracking_log_level: default_session_tracking_log_level(),
            redis_host: None,
            redis_port: None,
            redis_db: None,
            redis_password: None,
            redis_ssl: false,
        };
        assert_eq!(settings.lock_file_path("kalshi-ws"), "/var/run/kalshi/kalshi-ws.lock");
    }
}
