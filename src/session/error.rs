//! Session Error Types

use std::time::Duration;
use thiserror::Error;

use super::state::SessionStatus;
use super::token::Token;
use crate::engine::EngineError;

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    TokenNotFound(String),

    #[error("Malformed session token: {0:?}")]
    MalformedToken(String),

    /// The generator produced a token that is already registered
    #[error("Session token collision: {0}")]
    TokenCollision(Token),

    #[error("Invalid session state transition from {from} to {to}")]
    InvalidStateTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session is being deleted: {0}")]
    SessionDying(Token),

    #[error("Session {token} timed out after {}ms waiting for resume", .timeout.as_millis())]
    WaitTimedOut { token: Token, timeout: Duration },

    #[error("Maximum sessions reached: {0}")]
    MaxSessionsReached(usize),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl SessionError {
    /// Whether the error points at a defect in the server rather than the request
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::TokenCollision(_) | Self::InvalidStateTransition { .. }
        )
    }
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
