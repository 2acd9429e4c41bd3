// src/session/state.rs

//! Session lifecycle states.
//!
//! ```text
//! Idle -> Running -> { Completed, Failed, Cancelled, TimedOut }
//! ```
//!
//! Transitions are monotonic: nothing leaves a terminal state.

use std::fmt;

use serde::Serialize;

use crate::outcome::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    /// Finished with `Outcome::Success`.
    Completed,
    /// Finished with a worker-side `Outcome::Failure`.
    Failed,
    Cancelled,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Failed
                | SessionState::Cancelled
                | SessionState::TimedOut
        )
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Idle, SessionState::Running) => true,
            (SessionState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
            SessionState::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Snapshot published to session observers.
///
/// `outcome` is `Some` exactly when `state` is terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub outcome: Option<Outcome>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            outcome: None,
        }
    }
}
