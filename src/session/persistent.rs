//! Persistent Sessions
//!
//! A [`PersistentSession`] wraps one engine together with the lock and
//! condition variable that coordinate callers.
//!
//! # Locking
//!
//! The status mutex guards both the status and every call into the engine.
//! `run` holds it for the whole execution. When the engine pauses, the run
//! scope moves the session to `waiting` and blocks on the condition variable,
//! which releases the mutex until a resume or delete wakes it. While paused,
//! other callers may describe the session, read or write its memory, resume it
//! or delete it.
//!
//! # Abandoned waiters
//!
//! A waiter only leaves `waiting` through `resume` or `delete` (or the
//! optional wait timeout). Nothing else cleans up a paused session, so callers
//! that walk away from a paused run must delete the session.

use chrono::Utc;
use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use super::error::{SessionError, SessionResult};
use super::state::{checked_transition, SessionStatus};
use super::token::Token;
use crate::engine::{Engine, PauseNotifier, PauseOutcome};

/// Memory writes keyed by region name, each a list of `(index, value)`
pub type MemoryWrites = HashMap<String, Vec<(usize, i64)>>;

/// How the engine's memory was allocated; recorded as metadata only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMethod {
    #[default]
    Native,
    Foreign,
}

impl std::fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Foreign => write!(f, "foreign"),
        }
    }
}

/// One persistent compute session
pub struct PersistentSession {
    token: Token,
    engine: Box<dyn Engine>,
    status: Mutex<SessionStatus>,
    /// Signalled whenever a waiting session is resumed or marked dying
    status_changed: Condvar,
    metadata: BTreeMap<String, String>,
}

impl PersistentSession {
    /// Create a session in the `ready` state
    pub fn new(token: Token, engine: Box<dyn Engine>, allocation_method: AllocationMethod) -> Self {
        let created_at = Utc::now();
        let mut metadata = BTreeMap::new();
        metadata.insert("allocation_method".to_string(), allocation_method.to_string());
        metadata.insert("created".to_string(), created_at.to_rfc3339());

        Self {
            token,
            engine,
            status: Mutex::new(SessionStatus::Ready),
            status_changed: Condvar::new(),
            metadata,
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// Snapshot taken under the session lock
    pub fn info(&self) -> SessionInfo {
        let status = self.status.lock();
        SessionInfo {
            token: self.token.clone(),
            engine_type: self.engine.kind().to_string(),
            num_qubits: self.engine.number_of_qubits(),
            state: *status,
            metadata: self.metadata.clone(),
        }
    }

    /// Run a program to completion
    ///
    /// Requires `ready`. The session returns to `ready` afterwards whether the
    /// engine succeeds, fails or panics, unless it was marked dying meanwhile.
    pub fn run(&self, program: &str, wait_timeout: Option<Duration>) -> SessionResult<()> {
        let mut status = self.status.lock();
        if *status != SessionStatus::Ready {
            return Err(SessionError::InvalidStateTransition {
                from: *status,
                to: SessionStatus::Running,
            });
        }
        checked_transition(&mut status, SessionStatus::Running)?;
        debug!("Session {} running", self.token);

        let mut scope = RunScope {
            session: self,
            status,
            wait_timeout,
            timed_out: false,
        };
        let result = self.engine.run(program, &mut scope);
        let dying = *scope.status == SessionStatus::Dying;
        let timed_out = scope.timed_out;
        drop(scope);

        if timed_out {
            return Err(SessionError::WaitTimedOut {
                token: self.token.clone(),
                timeout: wait_timeout.unwrap_or_default(),
            });
        }
        if dying {
            warn!("Run on session {} cancelled by deletion", self.token);
            return Err(SessionError::SessionDying(self.token.clone()));
        }
        result.map_err(SessionError::from)
    }

    /// Wake the paused program
    ///
    /// Fails unless the session is `waiting`.
    pub fn resume(&self) -> SessionResult<()> {
        let mut status = self.status.lock();
        checked_transition(&mut status, SessionStatus::Resuming)?;
        debug!("Session {} resuming", self.token);
        self.status_changed.notify_all();
        Ok(())
    }

    /// Mark the session dying and wake any paused program so it can unwind
    ///
    /// Legal from every state. Blocks while a program is executing and not
    /// paused.
    pub fn mark_dying(&self) -> SessionResult<()> {
        let mut status = self.status.lock();
        checked_transition(&mut status, SessionStatus::Dying)?;
        debug!("Session {} dying", self.token);
        self.status_changed.notify_all();
        Ok(())
    }

    /// Apply a batch of memory writes
    ///
    /// Every write is validated before any is applied.
    pub fn write_memory(&self, writes: &MemoryWrites) -> SessionResult<()> {
        let status = self.status.lock();
        if status.is_terminal() {
            return Err(SessionError::SessionDying(self.token.clone()));
        }

        for (name, entries) in writes {
            for &(index, value) in entries {
                self.engine.validate_memory_write(name, index, value)?;
            }
        }
        for (name, entries) in writes {
            for &(index, value) in entries {
                self.engine.set_memory_ref(name, index, value)?;
            }
        }
        Ok(())
    }

    /// Read memory values from a single region
    pub fn read_memory(&self, name: &str, indices: &[usize]) -> SessionResult<Vec<i64>> {
        let status = self.status.lock();
        if status.is_terminal() {
            return Err(SessionError::SessionDying(self.token.clone()));
        }

        indices
            .iter()
            .map(|&index| self.engine.memory_ref(name, index).map_err(SessionError::from))
            .collect()
    }
}

impl std::fmt::Debug for PersistentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentSession")
            .field("token", &self.token)
            .field("engine", &self.engine.kind())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Holds the session lock for the duration of a run
///
/// Handed to the engine as its pause notifier. Dropping it restores `ready`.
struct RunScope<'a> {
    session: &'a PersistentSession,
    status: MutexGuard<'a, SessionStatus>,
    wait_timeout: Option<Duration>,
    timed_out: bool,
}

impl PauseNotifier for RunScope<'_> {
    fn pause(&mut self) -> PauseOutcome {
        let token = &self.session.token;
        if let Err(err) = checked_transition(&mut self.status, SessionStatus::Waiting) {
            error!("Session {} cannot pause: {}", token, err);
            return PauseOutcome::Cancelled;
        }
        debug!("Session {} waiting", token);

        // A deadline past the end of the clock is no deadline
        let deadline = self
            .wait_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        while *self.status == SessionStatus::Waiting {
            match deadline {
                Some(deadline) => {
                    let result = self
                        .session
                        .status_changed
                        .wait_until(&mut self.status, deadline);
                    if result.timed_out() && *self.status == SessionStatus::Waiting {
                        warn!("Session {} timed out waiting for resume", token);
                        self.timed_out =
                            checked_transition(&mut self.status, SessionStatus::Dying).is_ok();
                    }
                }
                None => self.session.status_changed.wait(&mut self.status),
            }
        }

        if *self.status == SessionStatus::Dying {
            return PauseOutcome::Cancelled;
        }
        match checked_transition(&mut self.status, SessionStatus::Running) {
            Ok(()) => {
                debug!("Session {} resumed", token);
                PauseOutcome::Resumed
            }
            Err(err) => {
                error!("Session {} woke in an unexpected state: {}", token, err);
                PauseOutcome::Cancelled
            }
        }
    }
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        // Unwinding out of a pause can leave the session mid-wait
        let path: &[SessionStatus] = match *self.status {
            SessionStatus::Dying => return,
            SessionStatus::Waiting => &[
                SessionStatus::Resuming,
                SessionStatus::Running,
                SessionStatus::Ready,
            ],
            SessionStatus::Resuming => &[SessionStatus::Running, SessionStatus::Ready],
            _ => &[SessionStatus::Ready],
        };
        for &next in path {
            if let Err(err) = checked_transition(&mut self.status, next) {
                error!(
                    "Session {} finished running in a bad state: {}",
                    self.session.token, err
                );
                return;
            }
        }
        debug!("Session {} ready", self.session.token);
    }
}

/// Serializable session description for API responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub token: Token,
    pub engine_type: String,
    pub num_qubits: usize,
    pub state: SessionStatus,
    pub metadata: BTreeMap<String, String>,
}
