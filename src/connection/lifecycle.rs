//! Connection Lifecycle (spec §4.2): protocol-agnostic state machine owning
//! the reconnect loop, health-monitor task, and broadcast fanout.

use super::handler::ConnectionHandler;
use super::state::{ConnectionState, StateMachine, StateTransition};
use crate::backoff::{BackoffEngine, FailureKind};
use crate::session_tracker::SessionTracker;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Tunables for the reconnect loop and health monitor (spec §6 env vars
/// `HEALTH_CHECK_INTERVAL_SECONDS`, `MAX_CONSECUTIVE_FAILURES`).
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub health_check_interval: Duration,
    pub max_consecutive_health_failures: u32,
    pub stop_grace: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            max_consecutive_health_failures: 3,
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Snapshot returned by `status()` (spec: "status() -> map"; a plain record
/// is the idiomatic translation per spec §9).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub consecutive_health_failures: u32,
}

/// Generic lifecycle manager driving a `ConnectionHandler` through
/// Disconnected → Connecting → Connected → (Reconnecting ↔ Connecting) →
/// ShuttingDown, with Failed as a sink reached on backoff exhaustion.
pub struct ConnectionLifecycle<H: ConnectionHandler + 'static> {
    handler: Arc<H>,
    state: Arc<StateMachine>,
    backoff: Arc<BackoffEngine>,
    sessions: Arc<SessionTracker>,
    sleeper: Arc<dyn Sleeper>,
    config: LifecycleConfig,
    shutdown: Arc<AtomicBool>,
    health_failures: Arc<AtomicU32>,
    health_task: AsyncMutex<Option<JoinHandle<()>>>,
    session_id: AsyncMutex<Option<u64>>,
}

impl<H: ConnectionHandler + 'static> ConnectionLifecycle<H> {
    pub fn new(
        handler: H,
        backoff: Arc<BackoffEngine>,
        sessions: Arc<SessionTracker>,
        config: LifecycleConfig,
    ) -> Self {
        Self::with_sleeper(handler, backoff, sessions, config, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        handler: H,
        backoff: Arc<BackoffEngine>,
        sessions: Arc<SessionTracker>,
        config: LifecycleConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            state: Arc::new(StateMachine::new()),
            backoff,
            sessions,
            sleeper,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            health_failures: Arc::new(AtomicU32::new(0)),
            health_task: AsyncMutex::new(None),
            session_id: AsyncMutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.state.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state.current(),
            consecutive_health_failures: self.health_failures.load(Ordering::SeqCst),
        }
    }

    /// `start()`: drives `connect_with_retry`, returning whether the
    /// connection ultimately succeeded.
    pub async fn start(self: &Arc<Self>) -> bool {
        self.shutdown.store(false, Ordering::SeqCst);
        self.connect_with_retry().await
    }

    async fn connect_with_retry(self: &Arc<Self>) -> bool {
        let service = self.handler.service_name().to_string();
        self.state.transition_to(ConnectionState::Connecting, None);

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return false;
            }

            match self.handler.establish().await {
                Ok(()) => {
                    self.backoff.reset(&service, Some(FailureKind::Network));
                    self.state.transition_to(ConnectionState::Connected, None);
                    let id = self.sessions.register(service.clone(), "connection");
                    *self.session_id.lock().await = Some(id);
                    self.spawn_health_monitor();
                    return true;
                }
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "establish failed");
                    if !self.backoff.should_retry(&service, FailureKind::Network) {
                        self.state.transition_to(
                            ConnectionState::Failed,
                            Some(format!("retries exhausted: {e}")),
                        );
                        return false;
                    }
                    let delay = self.backoff.calculate_delay(&service, FailureKind::Network, None);
                    if self.shutdown.load(Ordering::SeqCst) {
                        return false;
                    }
                    self.sleeper.sleep(Duration::from_secs_f64(delay)).await;
                }
            }
        }
    }

    fn spawn_health_monitor(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.health_check_interval);
            loop {
                interval.tick().await;
                if this.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                let result = this.handler.check_health().await;
                if result.healthy {
                    this.health_failures.store(0, Ordering::SeqCst);
                    continue;
                }
                let failures = this.health_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(
                    service = this.handler.service_name(),
                    failures,
                    error = ?result.error,
                    "health check failed"
                );
                if failures >= this.config.max_consecutive_health_failures {
                    this.health_failures.store(0, Ordering::SeqCst);
                    this.state.transition_to(ConnectionState::Reconnecting, result.error.clone());
                    this.handler.cleanup().await;
                    this.connect_with_retry().await;
                    return;
                }
            }
        });
        // Store the handle; drop any previous one (there should not be one).
        if let Ok(mut guard) = self.health_task.try_lock() {
            *guard = Some(handle);
        }
    }

    /// `stop()`: signal shutdown, cancel tasks within a bounded grace
    /// period, then clean up the transport. Release order per spec §5:
    /// message receivers first (handled by handler.cleanup for
    /// protocol-specific buffers), health monitor second, transport last.
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let task = self.health_task.lock().await.take();
        if let Some(handle) = task {
            let waited = tokio::time::timeout(self.config.stop_grace, handle).await;
            if waited.is_err() {
                tracing::warn!(
                    service = self.handler.service_name(),
                    "health monitor did not stop within grace period; aborting"
                );
            }
        }

        self.handler.cleanup().await;

        if let Some(id) = self.session_id.lock().await.take() {
            self.sessions.deregister(id);
        }

        self.state.transition_to(ConnectionState::ShuttingDown, None);
    }
}
