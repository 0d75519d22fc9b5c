//! Connection state machine for the push channel.

use tracing::{debug, info, warn};

use logscope_types::{ChannelEvent, ConnectionState, ConnectionStatus};

/// Reason recorded when the engine itself drops the connection
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// Tracks the push channel lifecycle.
///
/// Starts `Disconnected`, has no terminal state. Only events from the
/// current connection session are applied.
#[derive(Clone, Debug, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
    error: Option<String>,

    /// Session of the connection attempt in progress, if any
    session: Option<u64>,

    /// Reason of the last disconnect
    last_disconnect: Option<String>,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            error: self.error.clone(),
        }
    }

    pub fn session(&self) -> Option<u64> {
        self.session
    }

    pub fn last_disconnect(&self) -> Option<&str> {
        self.last_disconnect.as_deref()
    }

    /// Check if an event from this session should be applied
    pub fn accepts(&self, session: u64) -> bool {
        self.session == Some(session)
    }

    /// A connect was requested (startup or manual reconnect)
    pub fn begin_connect(&mut self, session: u64) {
        self.session = Some(session);
        self.transition(ConnectionState::Connecting, None);
    }

    /// Manual reconnect: always passes through disconnected, then connecting
    pub fn reconnect(&mut self, session: u64) {
        self.apply(&ChannelEvent::Disconnect {
            reason: CLIENT_DISCONNECT_REASON.to_string(),
        });
        self.begin_connect(session);
    }

    /// Apply a lifecycle event; returns whether the status changed.
    /// Log deliveries are not lifecycle events and are ignored here.
    pub fn apply(&mut self, event: &ChannelEvent) -> bool {
        match event {
            ChannelEvent::Connect => self.transition(ConnectionState::Connected, None),
            ChannelEvent::Disconnect { reason } => {
                self.last_disconnect = Some(reason.clone());
                self.transition(ConnectionState::Disconnected, None)
            }
            ChannelEvent::ConnectError { message } | ChannelEvent::Error { message } => {
                warn!(error = %message, "push channel error");
                self.transition(ConnectionState::Error, Some(message.clone()))
            }
            ChannelEvent::Log(_) => false,
        }
    }

    fn transition(&mut self, to: ConnectionState, error: Option<String>) -> bool {
        let changed = self.state != to || self.error != error;
        if self.state != to {
            info!(from = %self.state, to = %to, "connection state changed");
        } else if changed {
            debug!(state = %to, "connection error updated");
        }
        self.state = to;
        self.error = error;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnect(reason: &str) -> ChannelEvent {
        ChannelEvent::Disconnect {
            reason: reason.to_string(),
        }
    }

    fn error(message: &str) -> ChannelEvent {
        ChannelEvent::Error {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_starts_disconnected() {
        let machine = ConnectionMachine::new();
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(machine.status().error.is_none());
        assert!(machine.session().is_none());
    }

    #[test]
    fn test_connect_then_disconnect() {
        let mut machine = ConnectionMachine::new();
        assert!(machine.apply(&ChannelEvent::Connect));
        assert_eq!(machine.state(), ConnectionState::Connected);

        assert!(machine.apply(&disconnect("transport close")));
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(machine.last_disconnect(), Some("transport close"));
    }

    #[test]
    fn test_error_from_any_state() {
        for setup in [None, Some(ChannelEvent::Connect), Some(disconnect("x"))] {
            let mut machine = ConnectionMachine::new();
            machine.begin_connect(1);
            if let Some(event) = setup {
                machine.apply(&event);
            }
            machine.apply(&error("timeout"));
            let status = machine.status();
            assert_eq!(status.state, ConnectionState::Error);
            assert_eq!(status.error.as_deref(), Some("timeout"));
        }
    }

    #[test]
    fn test_disconnect_clears_error() {
        let mut machine = ConnectionMachine::new();
        machine.apply(&ChannelEvent::ConnectError {
            message: "refused".to_string(),
        });
        assert_eq!(machine.state(), ConnectionState::Error);

        machine.apply(&disconnect("transport close"));
        assert_eq!(machine.status(), ConnectionStatus::default());
    }

    #[test]
    fn test_reconnect_always_goes_through_connecting() {
        for setup in [
            ChannelEvent::Connect,
            error("boom"),
            disconnect("transport close"),
        ] {
            let mut machine = ConnectionMachine::new();
            machine.begin_connect(1);
            machine.apply(&setup);

            machine.reconnect(2);
            assert_eq!(machine.state(), ConnectionState::Connecting);
            assert_eq!(machine.session(), Some(2));
            assert_eq!(machine.last_disconnect(), Some(CLIENT_DISCONNECT_REASON));
        }
    }

    #[test]
    fn test_only_current_session_is_accepted() {
        let mut machine = ConnectionMachine::new();
        assert!(!machine.accepts(1));
        machine.begin_connect(1);
        assert!(machine.accepts(1));
        machine.reconnect(2);
        assert!(!machine.accepts(1));
        assert!(machine.accepts(2));
    }

    #[test]
    fn test_repeated_event_is_not_a_change() {
        let mut machine = ConnectionMachine::new();
        assert!(machine.apply(&ChannelEvent::Connect));
        assert!(!machine.apply(&ChannelEvent::Connect));
        assert!(!machine.apply(&ChannelEvent::Log("x".into())));
    }
}
