//! Connection state machine.
//!
//! `ConnectionState` is a closed set of states and `transition` is the only
//! place that decides how a session moves between them. The function is pure
//! so the whole lifecycle can be tested without any I/O.

use serde::Serialize;
use std::fmt;

/// Consecutive update failures tolerated before a session is abandoned.
pub const MAX_UPDATE_ERRORS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Not yet attempted.
    Init,
    Connecting,
    /// Live and healthy.
    Attached,
    /// Live, but the last read failed. Retried next cycle.
    AttachedUpdateError,
    /// Peer rejected us or permission was denied.
    ConnectionRefused,
    ErrorDuringAttach,
    /// Abandoned for the rest of the run.
    Detached,
}

/// Something that happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectStarted,
    Connected,
    /// The transport reported the peer as dead.
    LivenessLost,
    Refused,
    AttachFailed,
    UpdateSucceeded,
    /// An update cycle failed; carries the session's failure count so far.
    UpdateFailed { error_count: u32 },
}

impl ConnectionState {
    /// States that are never left again and suppress all further I/O.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectionRefused
                | ConnectionState::ErrorDuringAttach
                | ConnectionState::Detached
        )
    }

    /// States in which a connection exists and reads are attempted.
    pub fn is_attached(self) -> bool {
        matches!(
            self,
            ConnectionState::Attached | ConnectionState::AttachedUpdateError
        )
    }

    pub fn transition(self, event: SessionEvent) -> ConnectionState {
        use ConnectionState::*;
        use SessionEvent::*;

        if self.is_terminal() {
            return self;
        }

        match (self, event) {
            (Init, ConnectStarted) => Connecting,
            (Init, AttachFailed) => ErrorDuringAttach,
            (Init, Refused) => ConnectionRefused,
            (Connecting, Connected) => Attached,
            (Connecting, Refused) => ConnectionRefused,
            (Connecting, AttachFailed) => ErrorDuringAttach,
            (_, LivenessLost) => Detached,
            (Attached | AttachedUpdateError, UpdateSucceeded) => Attached,
            (Attached | AttachedUpdateError, UpdateFailed { error_count }) => {
                if error_count > MAX_UPDATE_ERRORS {
                    Detached
                } else {
                    AttachedUpdateError
                }
            }
            (state, _) => state,
        }
    }

    /// Marker shown instead of metrics, `None` when metrics are valid.
    pub fn error_marker(self) -> Option<&'static str> {
        match self {
            ConnectionState::Attached => None,
            ConnectionState::Init | ConnectionState::Connecting => Some("[Connecting ...]"),
            ConnectionState::AttachedUpdateError => {
                Some("[ERROR: Could not fetch telemetries (Process DEAD?)]")
            }
            ConnectionState::ErrorDuringAttach => Some("[ERROR: Could not attach to VM]"),
            ConnectionState::ConnectionRefused => {
                Some("[ERROR: Connection refused/access denied]")
            }
            ConnectionState::Detached => Some("[ERROR: Detached]"),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Init => "INIT",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Attached => "ATTACHED",
            ConnectionState::AttachedUpdateError => "ATTACHED_UPDATE_ERROR",
            ConnectionState::ConnectionRefused => "CONNECTION_REFUSED",
            ConnectionState::ErrorDuringAttach => "ERROR_DURING_ATTACH",
            ConnectionState::Detached => "DETACHED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;
    use SessionEvent::*;

    #[test]
    fn test_successful_connect() {
        let state = Init.transition(ConnectStarted).transition(Connected);
        assert_eq!(state, Attached);
    }

    #[test]
    fn test_dead_after_connect_never_attaches() {
        let connecting = Init.transition(ConnectStarted);
        assert_eq!(connecting.transition(LivenessLost), Detached);
    }

    #[test]
    fn test_attach_failures() {
        assert_eq!(Init.transition(ConnectStarted).transition(Refused), ConnectionRefused);
        assert_eq!(
            Init.transition(ConnectStarted).transition(AttachFailed),
            ErrorDuringAttach
        );
        assert_eq!(Init.transition(AttachFailed), ErrorDuringAttach);
    }

    #[test]
    fn test_terminal_states_absorb_everything() {
        let events = [
            ConnectStarted,
            Connected,
            LivenessLost,
            Refused,
            AttachFailed,
            UpdateSucceeded,
            UpdateFailed { error_count: 1 },
        ];
        for terminal in [ConnectionRefused, ErrorDuringAttach, Detached] {
            assert!(terminal.is_terminal());
            for event in events {
                assert_eq!(terminal.transition(event), terminal);
            }
        }
    }

    #[test]
    fn test_update_errors_oscillate_until_threshold() {
        let state = Attached.transition(UpdateFailed { error_count: 1 });
        assert_eq!(state, AttachedUpdateError);
        assert_eq!(state.transition(UpdateSucceeded), Attached);

        let at_limit = Attached.transition(UpdateFailed {
            error_count: MAX_UPDATE_ERRORS,
        });
        assert_eq!(at_limit, AttachedUpdateError);

        let over_limit = AttachedUpdateError.transition(UpdateFailed {
            error_count: MAX_UPDATE_ERRORS + 1,
        });
        assert_eq!(over_limit, Detached);
    }

    #[test]
    fn test_unrelated_events_keep_state() {
        assert_eq!(Init.transition(UpdateSucceeded), Init);
        assert_eq!(Attached.transition(Connected), Attached);
    }

    #[test]
    fn test_markers() {
        assert_eq!(Attached.error_marker(), None);
        assert!(AttachedUpdateError
            .error_marker()
            .unwrap()
            .contains("Could not fetch"));
        assert_eq!(Detached.to_string(), "DETACHED");
    }
}
