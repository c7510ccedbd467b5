//! Simulation Engine Interface
//!
//! A session owns exactly one engine. The session layer never looks inside
//! it: it only asks for the qubit count, reads and writes classical memory,
//! and hands programs to `run`.
//!
//! Suspension works through [`PauseNotifier`]. The session passes one into
//! `run`, and the engine calls [`PauseNotifier::pause`] whenever the program
//! has to stop and wait for an external resume. The call blocks until the
//! session is resumed or deleted.

pub mod basis;

pub use basis::BasisStateEngine;

use thiserror::Error;

/// How a pause ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// The session was resumed; execution continues
    Resumed,
    /// The session is being torn down; the engine must abandon the program
    Cancelled,
}

/// Suspension point handed to [`Engine::run`]
///
/// Invoked synchronously on the thread executing `run`. The owning session's
/// lock is held on entry and on return, and released while blocked.
pub trait PauseNotifier {
    /// Block until the session is resumed or cancelled
    fn pause(&mut self) -> PauseOutcome;
}

/// Engine handle owned by a persistent session
///
/// Methods take `&self`: the handle is fixed for the life of the session while
/// the machine state behind it mutates. The session serialises every call
/// under its own lock, but a paused `run` lets memory calls through, so
/// implementations must not hold internal locks across
/// [`PauseNotifier::pause`].
pub trait Engine: Send + Sync {
    /// Short engine type name reported by `describe`
    fn kind(&self) -> &'static str;

    fn number_of_qubits(&self) -> usize;

    /// Read one element of a classical memory region
    fn memory_ref(&self, name: &str, index: usize) -> Result<i64, EngineError>;

    /// Write one element of a classical memory region
    fn set_memory_ref(&self, name: &str, index: usize, value: i64) -> Result<(), EngineError>;

    /// Check that a write would succeed without performing it
    fn validate_memory_write(&self, name: &str, index: usize, value: i64) -> Result<(), EngineError>;

    /// Execute a program, pausing through `pause` as the program demands
    ///
    /// Must return [`EngineError::Cancelled`] promptly once `pause` reports
    /// [`PauseOutcome::Cancelled`].
    fn run(&self, program: &str, pause: &mut dyn PauseNotifier) -> Result<(), EngineError>;
}

/// Errors surfaced by an engine during `run` or memory access
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unknown memory region: {0}")]
    UnknownRegion(String),

    #[error("Memory region {0} is already declared with a different type or length")]
    RegionConflict(String),

    #[error("Index {index} out of bounds for region {name} of length {length}")]
    IndexOutOfBounds {
        name: String,
        index: usize,
        length: usize,
    },

    #[error("Value {value} does not fit in {region_type} region {name}")]
    ValueOutOfRange {
        name: String,
        region_type: String,
        value: i64,
    },

    #[error("Qubit {qubit} out of range for a {available}-qubit machine")]
    QubitOutOfRange { qubit: usize, available: usize },

    #[error("Unsupported instruction: {0}")]
    Unsupported(String),

    #[error("Execution cancelled")]
    Cancelled,
}
