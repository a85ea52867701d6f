//! Session Tracker (spec §2): a leak-diagnostics registry of outstanding
//! transport sessions. Every REST/WebSocket/Scraper session registers on
//! `establish` and deregisters on `cleanup`; anything still registered at
//! shutdown is a leak to log loudly about.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// One entry per outstanding transport session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: u64,
    pub service: String,
    pub kind: &'static str,
    pub opened_at_unix: u64,
}

/// Registry of outstanding sessions, shared across all connection-lifecycle
/// instances in a process (spec §9: global singletons become explicit state
/// constructed once and passed around, not module-level statics).
#[derive(Debug, Default)]
pub struct SessionTracker {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, SessionInfo>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-established session, returning its tracking id.
    pub fn register(&self, service: impl Into<String>, kind: &'static str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let info = SessionInfo {
            id,
            service: service.into(),
            kind,
            opened_at_unix: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs(),
        };
        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).insert(id, info);
        id
    }

    /// Deregister a session on clean shutdown.
    pub fn deregister(&self, id: u64) {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).remove(&id);
    }

    /// Snapshot of everything still outstanding — called at process
    /// shutdown to log leaked sessions.
    pub fn outstanding(&self) -> Vec<SessionInfo> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Log every still-outstanding session at WARN — intended for a
    /// process-exit hook.
    pub fn log_leaks(&self) {
        for info in self.outstanding() {
            tracing::warn!(
                session_id = info.id,
                service = %info.service,
                kind = info.kind,
                opened_at_unix = info.opened_at_unix,
                "session leaked: never deregistered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_deregister_is_balanced() {
        let tracker = SessionTracker::new();
        let id = tracker.register("rest-service", "rest");
        assert_eq!(tracker.count(), 1);
        tracker.deregister(id);
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn distinct_registrations_get_distinct_ids() {
        let tracker = SessionTracker::new();
        let a = tracker.register("svc", "rest");
        let b = tracker.register("svc", "ws");
        assert_ne!(a, b);
        assert_eq!(tracker.count(), 2);
    }

    #[test]
    fn outstanding_reports_leaked_sessions() {
        let tracker = SessionTracker::new();
        tracker.register("svc", "scraper");
        let snapshot = tracker.outstanding();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].kind, "scraper");
    }
}
