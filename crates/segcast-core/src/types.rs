//! Connection lifecycle states.

use std::fmt;

/// Lifecycle of a client connection.
///
/// `Onboarding → Live → Closed`, or `Onboarding → Closed` when the backlog
/// replay fails. A connection is only ever registered for live broadcasts
/// while `Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Receiving the backlog; not yet eligible for live frames.
    Onboarding,
    /// Registered; receives every newly finalized segment.
    Live,
    /// Torn down; the socket has been released.
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (Self::Onboarding, Self::Live)
                | (Self::Onboarding, Self::Closed)
                | (Self::Live, Self::Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Onboarding => write!(f, "onboarding"),
            Self::Live => write!(f, "live"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use ConnectionState::*;
        assert!(Onboarding.can_transition_to(Live));
        assert!(Onboarding.can_transition_to(Closed));
        assert!(Live.can_transition_to(Closed));

        assert!(!Live.can_transition_to(Onboarding));
        assert!(!Closed.can_transition_to(Live));
        assert!(!Closed.can_transition_to(Onboarding));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Onboarding.to_string(), "onboarding");
        assert_eq!(ConnectionState::Live.to_string(), "live");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
