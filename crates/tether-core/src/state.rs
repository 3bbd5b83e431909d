//! Connection lifecycle states and the transition table.

use std::fmt;

/// Lifecycle state of an [`HttpConnection`](crate::HttpConnection).
///
/// ```text
/// Disconnected ──▶ Starting ──▶ Connected
///      ▲              │             │
///      └──────────────┘             │
///      │                            ▼
///      └──────────────────────▶ Disposing ──▶ Disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Initial state; nothing is running.
    #[default]
    Disconnected,
    /// A start operation is in flight.
    Starting,
    /// A transport is active and owns the channel.
    Connected,
    /// A dispose operation is in flight.
    Disposing,
    /// Terminal state.
    Disposed,
}

impl ConnectionState {
    /// Returns whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Disconnected, Starting)
                | (Starting, Connected)
                | (Starting, Disconnected)
                | (Disconnected | Starting | Connected, Disposing)
                | (Disposing, Disposed)
        )
    }

    /// Returns whether no transition can leave this state.
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Disposed
    }

    /// Returns the state name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Starting => "Starting",
            Self::Connected => "Connected",
            Self::Disposing => "Disposing",
            Self::Disposed => "Disposed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    const ALL: [ConnectionState; 5] = [Disconnected, Starting, Connected, Disposing, Disposed];

    #[test]
    fn test_starting_only_from_disconnected() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Starting), from == Disconnected);
        }
    }

    #[test]
    fn test_connected_only_from_starting() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Connected), from == Starting);
        }
    }

    #[test]
    fn test_disposing_from_any_non_terminal() {
        assert!(Disconnected.can_transition_to(Disposing));
        assert!(Starting.can_transition_to(Disposing));
        assert!(Connected.can_transition_to(Disposing));
        assert!(!Disposing.can_transition_to(Disposing));
        assert!(!Disposed.can_transition_to(Disposing));
    }

    #[test]
    fn test_disposed_is_terminal() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Disposed), from == Disposing);
            assert!(!Disposed.can_transition_to(from));
        }
        assert!(Disposed.is_terminal());
    }
}
