//! Persistent Session Module
//!
//! Long-lived compute sessions, each wrapping one simulation engine:
//! - Opaque UUID tokens, validated before any registry lookup
//! - A registry guarded by a single lock, separate from every session lock
//! - A checked state machine (ready, running, waiting, resuming, dying)
//! - Cooperative pausing: a running program can wait for an external resume,
//!   and deleting the session cancels the wait

pub mod error;
pub mod manager;
pub mod persistent;
pub mod registry;
pub mod state;
pub mod token;

pub use error::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use persistent::{AllocationMethod, MemoryWrites, PersistentSession, SessionInfo};
pub use registry::SessionRegistry;
pub use state::{checked_transition, SessionStatus};
pub use token::{is_valid_token, Token};
