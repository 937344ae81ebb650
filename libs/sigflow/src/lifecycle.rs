//! Block lifecycle states and the validated transition table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State of a block inside a flow graph
///
/// Used by the scheduler for internal tracking and exposed through the
/// polymorphic block handle for external observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Constructed but not yet registered into a graph
    Idle,
    /// Registered and initialised, ready to run
    Initialised,
    /// Actively processing samples
    Running,
    /// Stop requested; the block winds down at its next work() boundary
    RequestedStop,
    /// Pause requested; the block parks at its next work() boundary
    RequestedPause,
    /// Fully stopped
    Stopped,
    /// Temporarily paused (resources still allocated)
    Paused,
    /// Terminal error state
    Error,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Initialised => write!(f, "Initialised"),
            Self::Running => write!(f, "Running"),
            Self::RequestedStop => write!(f, "RequestedStop"),
            Self::RequestedPause => write!(f, "RequestedPause"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Paused => write!(f, "Paused"),
            Self::Error => write!(f, "Error"),
        }
    }
}

impl LifecycleState {
    /// Whether a transition from `self` to `to` is allowed.
    ///
    /// Any state may transition to [`LifecycleState::Error`]; everything
    /// else follows the lifecycle graph:
    /// Idle → Initialised → Running ⇄ {RequestedPause → Paused},
    /// Running → RequestedStop → Stopped.
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        if to == Error {
            return true;
        }
        matches!(
            (self, to),
            (Idle, Initialised)
                | (Initialised, Running)
                | (Running, RequestedStop)
                | (Running, RequestedPause)
                | (RequestedStop, Stopped)
                | (RequestedPause, Paused)
                | (Paused, Running)
        )
    }
}

/// Rejected lifecycle transition; the state is left unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid lifecycle transition {from} -> {to}")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        use LifecycleState::*;
        let path = [Idle, Initialised, Running, RequestedStop, Stopped];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_pause_resume() {
        use LifecycleState::*;
        assert!(Running.can_transition_to(RequestedPause));
        assert!(RequestedPause.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
    }

    #[test]
    fn test_error_is_reachable_from_anywhere() {
        use LifecycleState::*;
        for s in [Idle, Initialised, Running, RequestedStop, RequestedPause, Stopped, Paused] {
            assert!(s.can_transition_to(Error));
        }
    }

    #[test]
    fn test_illegal_transitions() {
        use LifecycleState::*;
        assert!(!Idle.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Running.can_transition_to(Stopped));
        assert!(!Error.can_transition_to(Running));
        assert!(!Paused.can_transition_to(Stopped));
    }
}
