//! Session State Machine
//!
//! ```text
//!            run                 pause
//!   ready ─────────► running ─────────► waiting
//!     ▲                │  ▲                │
//!     └────────────────┘  └── resuming ◄───┘
//!          finished               resume
//!
//!   any state ──── delete ────► dying (terminal)
//! ```

use serde::{Deserialize, Serialize};

use super::error::{SessionError, SessionResult};

/// Status of a persistent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Idle; a program may be run
    Ready,
    /// A program is executing
    Running,
    /// The running program is paused until resumed
    Waiting,
    /// Resume requested; the paused program has not picked it up yet
    Resuming,
    /// Marked for deletion
    Dying,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Ready
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::Resuming => write!(f, "resuming"),
            Self::Dying => write!(f, "dying"),
        }
    }
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        Self::Ready,
        Self::Running,
        Self::Waiting,
        Self::Resuming,
        Self::Dying,
    ];

    /// States reachable in one step
    pub const fn allowed_transitions(self) -> &'static [SessionStatus] {
        match self {
            Self::Ready => &[Self::Running, Self::Dying],
            Self::Running => &[Self::Ready, Self::Waiting, Self::Dying],
            Self::Waiting => &[Self::Resuming, Self::Dying],
            Self::Resuming => &[Self::Running, Self::Dying],
            Self::Dying => &[Self::Dying],
        }
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Check if the session is terminal
    pub fn is_terminal(self) -> bool {
        self == Self::Dying
    }
}

/// Move `status` to `next` if the table allows it
///
/// Takes the status by mutable reference so it can only be called through the
/// session's lock guard. A rejected transition is a protocol violation and
/// leaves `status` untouched.
pub fn checked_transition(status: &mut SessionStatus, next: SessionStatus) -> SessionResult<()> {
    if !status.can_transition_to(next) {
        return Err(SessionError::InvalidStateTransition {
            from: *status,
            to: next,
        });
    }
    *status = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status() {
        assert_eq!(SessionStatus::default(), SessionStatus::Ready);
        assert!(!SessionStatus::Ready.is_terminal());
        assert!(SessionStatus::Dying.is_terminal());
    }

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;

        let legal = [
            (Ready, Running),
            (Ready, Dying),
            (Running, Ready),
            (Running, Waiting),
            (Running, Dying),
            (Waiting, Resuming),
            (Waiting, Dying),
            (Resuming, Running),
            (Resuming, Dying),
            (Dying, Dying),
        ];

        for from in SessionStatus::ALL {
            for to in SessionStatus::ALL {
                let mut status = from;
                let result = checked_transition(&mut status, to);
                if legal.contains(&(from, to)) {
                    assert!(result.is_ok(), "{} -> {} should be legal", from, to);
                    assert_eq!(status, to);
                } else {
                    assert!(
                        matches!(
                            result,
                            Err(SessionError::InvalidStateTransition { from: f, to: t }) if f == from && t == to
                        ),
                        "{} -> {} should be rejected",
                        from,
                        to
                    );
                    assert_eq!(status, from);
                }
            }
        }
    }

    #[test]
    fn test_dying_is_reachable_from_everywhere() {
        for from in SessionStatus::ALL {
            assert!(from.can_transition_to(SessionStatus::Dying));
        }
    }

    #[test]
    fn test_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Waiting).unwrap(),
            "\"waiting\""
        );
        let status: SessionStatus = serde_json::from_str("\"resuming\"").unwrap();
        assert_eq!(status, SessionStatus::Resuming);
    }
}
