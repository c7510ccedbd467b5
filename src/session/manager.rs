//! Session Manager
//!
//! Public operations on persistent sessions. Every operation validates the
//! token, resolves it through the registry, then works on the session under
//! the session's own lock. The two locks are never held together.

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::error::{SessionError, SessionResult};
use super::persistent::{AllocationMethod, MemoryWrites, PersistentSession, SessionInfo};
use super::registry::SessionRegistry;
use super::token::Token;
use crate::engine::Engine;

/// Default cap on live sessions
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Session Manager - handles many concurrent persistent sessions
#[derive(Debug)]
pub struct SessionManager {
    registry: SessionRegistry,
    /// Maximum live sessions allowed
    max_sessions: usize,
    /// How long a paused program may wait before its session is killed
    wait_timeout: Option<Duration>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, None)
    }

    /// Create with custom limits
    pub fn with_limits(max_sessions: usize, wait_timeout: Option<Duration>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            max_sessions,
            wait_timeout,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Create a session around `engine` and return its token
    pub fn allocate(
        &self,
        engine: Box<dyn Engine>,
        allocation_method: AllocationMethod,
    ) -> SessionResult<Token> {
        let num_qubits = engine.number_of_qubits();
        let session = self.registry.create(self.max_sessions, |token| {
            PersistentSession::new(token, engine, allocation_method)
        })?;

        info!(
            "Allocated session {} ({} qubits, {})",
            session.token(),
            num_qubits,
            allocation_method
        );
        Ok(session.token().clone())
    }

    /// Kill a session, waking any paused program, and unregister it
    ///
    /// Not idempotent: a second delete fails with `TokenNotFound`.
    pub fn delete(&self, token: &str) -> SessionResult<()> {
        let session = self.resolve(token)?;
        session.mark_dying()?;

        if self.registry.remove(token).is_none() {
            // Lost a race with a concurrent delete
            return Err(SessionError::TokenNotFound(token.to_string()));
        }
        info!("Deleted session {}", token);
        Ok(())
    }

    pub fn describe(&self, token: &str) -> SessionResult<SessionInfo> {
        Ok(self.resolve(token)?.info())
    }

    /// Run a program on a `ready` session, blocking until it finishes
    ///
    /// The call blocks for as long as the program stays paused.
    pub fn run(&self, token: &str, program: &str) -> SessionResult<()> {
        let session = self.resolve(token)?;
        let result = session.run(program, self.wait_timeout);

        match &result {
            Err(SessionError::WaitTimedOut { .. }) => {
                // A timed-out session is dead; unregister it the way delete would
                self.registry.remove(token);
                warn!("Removed session {} after wait timeout", token);
            }
            Err(err) if err.is_internal() => error!("Run on session {} failed: {}", token, err),
            _ => {}
        }
        result
    }

    pub fn write_memory(&self, token: &str, writes: &MemoryWrites) -> SessionResult<()> {
        self.resolve(token)?.write_memory(writes)
    }

    pub fn read_memory(&self, token: &str, name: &str, indices: &[usize]) -> SessionResult<Vec<i64>> {
        self.resolve(token)?.read_memory(name, indices)
    }

    /// Resume a paused program
    pub fn resume(&self, token: &str) -> SessionResult<()> {
        self.resolve(token)?.resume()
    }

    /// Get all sessions
    ///
    /// Blocks on any session that is mid-run and not paused.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.registry.sessions().iter().map(|s| s.info()).collect()
    }

    /// Get total session count
    pub fn session_count(&self) -> usize {
        self.registry.count()
    }

    /// Check if a session exists
    pub fn session_exists(&self, token: &str) -> bool {
        self.registry.lookup(token).is_some()
    }

    /// Delete every session - for cleanup on server exit
    ///
    /// Paused programs are woken and observe cancellation.
    pub fn shutdown_all(&self) {
        info!("Shutting down all sessions...");

        for token in self.registry.tokens() {
            if let Err(e) = self.delete(token.as_str()) {
                warn!("Error deleting session {}: {}", token, e);
            }
        }

        info!("All sessions shut down");
    }

    fn resolve(&self, token: &str) -> SessionResult<Arc<PersistentSession>> {
        Token::parse(token)?;
        self.registry.lookup_or_fail(token)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
