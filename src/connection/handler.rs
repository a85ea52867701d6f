//! Protocol-specific hooks the generic lifecycle drives (spec §9: "protocol
//! classes" map to interfaces).

use crate::error::CoreError;
use crate::health::HealthCheckResult;
use async_trait::async_trait;

/// Implemented once per protocol (REST, WebSocket, scraper). The generic
/// `ConnectionLifecycle` owns the state machine, reconnect loop, and health
/// monitor task; it only calls out to these three hooks.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// Open the underlying transport. Returning `Err` or the loop treating
    /// it as failed triggers the backoff-paced retry in
    /// `connect_with_retry`.
    async fn establish(&self) -> Result<(), CoreError>;

    /// Protocol-specific liveness probe, invoked periodically by the health
    /// monitor task.
    async fn check_health(&self) -> HealthCheckResult;

    /// Release transport resources. Called from `stop()` and before each
    /// reconnection attempt. Must be safe to call on a transport that was
    /// never successfully established.
    async fn cleanup(&self);

    /// Human-readable name used in logs, backoff-engine service keys, and
    /// session-tracker registrations.
    fn service_name(&self) -> &str;
}
