//! `ConnectionState` state machine and its broadcast transitions (spec §3,
//! §4.2).

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

/// Connection lifecycle state. Initial = `Disconnected`; terminal =
/// `ShuttingDown`. `Failed` is a sink reached once the Backoff Engine's
/// `network` kind exhausts `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    ShuttingDown,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::ShuttingDown => "shutting_down",
            ConnectionState::Failed => "failed",
        }
    }

    /// Whether `to` is a transition this state machine permits from `self`.
    /// Enforced by `StateMachine::transition_to` so an out-of-band caller
    /// cannot corrupt the machine.
    fn allows(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connecting, Disconnected)
                | (Connected, Reconnecting)
                | (Connected, ShuttingDown)
                | (Reconnecting, Connecting)
                | (Reconnecting, Connected)
                | (Reconnecting, Failed)
                | (Reconnecting, ShuttingDown)
                | (Failed, Connecting)
                | (Failed, ShuttingDown)
                | (Disconnected, ShuttingDown)
        )
    }
}

/// A published state transition (spec §4.2: "All transitions logged and
/// broadcast").
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub at_unix_millis: u128,
    pub error: Option<String>,
}

/// The sole mutator of `ConnectionState` for one Connection Lifecycle
/// instance; `transition_to` is the only way to change state, and every
/// change is logged and broadcast in publication order (spec §5).
#[derive(Debug)]
pub struct StateMachine {
    current: std::sync::Mutex<ConnectionState>,
    sender: broadcast::Sender<StateTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(64);
        Self { current: std::sync::Mutex::new(ConnectionState::Disconnected), sender }
    }

    pub fn current(&self) -> ConnectionState {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.sender.subscribe()
    }

    /// Attempt a transition. Returns `false` (without broadcasting or
    /// mutating) if the transition is not permitted from the current state.
    pub fn transition_to(&self, to: ConnectionState, error: Option<String>) -> bool {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if !current.allows(to) {
            tracing::warn!(from = current.as_str(), to = to.as_str(), "rejected illegal transition");
            return false;
        }
        let from = *current;
        *current = to;
        drop(current);

        tracing::info!(from = from.as_str(), to = to.as_str(), "connection state transition");

        let transition = StateTransition {
            from,
            to,
            at_unix_millis: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis(),
            error,
        };
        // Broadcasting must not block the mutator; `send` only fails when
        // there are no receivers, which is not an error for us.
        let _ = self.sender.send(transition);
        true
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), ConnectionState::Disconnected);
    }

    #[test]
    fn legal_transition_updates_state_and_broadcasts() {
        let sm = StateMachine::new();
        let mut rx = sm.subscribe();
        assert!(sm.transition_to(ConnectionState::Connecting, None));
        assert_eq!(sm.current(), ConnectionState::Connecting);
        let transition = rx.try_recv().unwrap();
        assert_eq!(transition.from, ConnectionState::Disconnected);
        assert_eq!(transition.to, ConnectionState::Connecting);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let sm = StateMachine::new();
        // Disconnected -> Connected is not a direct legal transition.
        assert!(!sm.transition_to(ConnectionState::Connected, None));
        assert_eq!(sm.current(), ConnectionState::Disconnected);
    }

    #[test]
    fn failed_is_not_terminal_reconnect_is_possible() {
        let sm = StateMachine::new();
        assert!(sm.transition_to(ConnectionState::Connecting, None));
        assert!(sm.transition_to(ConnectionState::Failed, Some("exhausted".into())));
        assert!(sm.transition_to(ConnectionState::Connecting, None));
    }

    #[test]
    fn shutting_down_is_reachable_from_every_non_terminal_state() {
        let sm = StateMachine::new();
        assert!(sm.transition_to(ConnectionState::ShuttingDown, None));
    }

    #[test]
    fn publication_order_matches_transition_order() {
        let sm = StateMachine::new();
        let mut rx = sm.subscribe();
        sm.transition_to(ConnectionState::Connecting, None);
        sm.transition_to(ConnectionState::Connected, None);
        sm.transition_to(ConnectionState::Reconnecting, None);

        assert_eq!(rx.try_recv().unwrap().to, ConnectionState::Connecting);
        assert_eq!(rx.try_recv().unwrap().to, ConnectionState::Connected);
        assert_eq!(rx.try_recv().unwrap().to, ConnectionState::Reconnecting);
    }
}
