//! Session Registry
//!
//! The single token to session mapping shared by all callers. One registry
//! lock guards membership only; it is never held while a session's own lock
//! is taken, and never across a program run.

use log::{debug, error};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::error::{SessionError, SessionResult};
use super::persistent::PersistentSession;
use super::token::Token;

/// Token-keyed registry of live sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Token, Arc<PersistentSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under its own token
    ///
    /// A collision means the token generator is broken; the existing entry is
    /// left untouched.
    pub fn insert(&self, session: Arc<PersistentSession>) -> SessionResult<()> {
        let mut sessions = self.sessions.write();
        Self::insert_locked(&mut sessions, session)
    }

    /// Mint a token, build a session for it and insert it, all under the
    /// registry lock
    ///
    /// Fails with `MaxSessionsReached` when `max_sessions` entries already
    /// exist.
    pub fn create<F>(&self, max_sessions: usize, build: F) -> SessionResult<Arc<PersistentSession>>
    where
        F: FnOnce(Token) -> PersistentSession,
    {
        let mut sessions = self.sessions.write();
        if sessions.len() >= max_sessions {
            return Err(SessionError::MaxSessionsReached(max_sessions));
        }

        let session = Arc::new(build(Token::generate()));
        Self::insert_locked(&mut sessions, Arc::clone(&session))?;
        Ok(session)
    }

    fn insert_locked(
        sessions: &mut HashMap<Token, Arc<PersistentSession>>,
        session: Arc<PersistentSession>,
    ) -> SessionResult<()> {
        let token = session.token().clone();
        if sessions.contains_key(&token) {
            error!("Session token collision: {}", token);
            return Err(SessionError::TokenCollision(token));
        }
        debug!("Registered session {}", token);
        sessions.insert(token, session);
        Ok(())
    }

    pub fn lookup(&self, token: &str) -> Option<Arc<PersistentSession>> {
        self.sessions.read().get(token).cloned()
    }

    pub fn lookup_or_fail(&self, token: &str) -> SessionResult<Arc<PersistentSession>> {
        self.lookup(token)
            .ok_or_else(|| SessionError::TokenNotFound(token.to_string()))
    }

    /// Remove a session, returning it if it was still registered
    pub fn remove(&self, token: &str) -> Option<Arc<PersistentSession>> {
        self.sessions.write().remove(token)
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Snapshot of every registered session
    pub fn sessions(&self) -> Vec<Arc<PersistentSession>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Drop every entry without touching session state
    pub fn reset(&self) {
        self.sessions.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BasisStateEngine;
    use crate::session::persistent::AllocationMethod;

    fn build(token: Token) -> PersistentSession {
        PersistentSession::new(token, Box::new(BasisStateEngine::new(1)), AllocationMethod::Native)
    }

    #[test]
    fn test_create_and_lookup() {
        let registry = SessionRegistry::new();
        let session = registry.create(10, build).unwrap();
        let token = session.token().clone();

        assert_eq!(registry.count(), 1);
        let found = registry.lookup(token.as_str()).unwrap();
        assert!(Arc::ptr_eq(&found, &session));
        assert_eq!(registry.tokens(), vec![token]);
    }

    #[test]
    fn test_lookup_or_fail() {
        let registry = SessionRegistry::new();
        let missing = Token::generate();

        assert!(registry.lookup(missing.as_str()).is_none());
        assert!(matches!(
            registry.lookup_or_fail(missing.as_str()),
            Err(SessionError::TokenNotFound(ref t)) if t == missing.as_str()
        ));
    }

    #[test]
    fn test_collision_is_rejected() {
        let registry = SessionRegistry::new();
        let token = Token::generate();
        let first = Arc::new(build(token.clone()));
        registry.insert(Arc::clone(&first)).unwrap();

        let result = registry.insert(Arc::new(build(token.clone())));

        assert!(matches!(result, Err(SessionError::TokenCollision(ref t)) if *t == token));
        assert!(Arc::ptr_eq(&registry.lookup(token.as_str()).unwrap(), &first));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let registry = SessionRegistry::new();
        registry.create(2, build).unwrap();
        registry.create(2, build).unwrap();

        assert!(matches!(
            registry.create(2, build),
            Err(SessionError::MaxSessionsReached(2))
        ));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_remove_and_reset() {
        let registry = SessionRegistry::new();
        let token = registry.create(10, build).unwrap().token().clone();
        registry.create(10, build).unwrap();

        assert!(registry.remove(token.as_str()).is_some());
        assert!(registry.remove(token.as_str()).is_none());
        assert_eq!(registry.count(), 1);

        registry.reset();
        assert_eq!(registry.count(), 0);
    }
}
