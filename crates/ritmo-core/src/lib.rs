//! Core types and error definitions for the Ritmo scheduler.
//!
//! This crate provides the foundation shared by all Ritmo crates: the unified
//! error enum, the worker-invocation seam, and the abstract observability
//! sinks the control loop writes to.
//!
//! # Main types
//!
//! - [`RitmoError`] — Unified error enum for all scheduler subsystems.
//! - [`RitmoResult`] — Convenience alias for `Result<T, RitmoError>`.
//! - [`WorkerInvocation`] — The interface every registered worker implements.
//! - [`InvocationOutcome`] — What a worker reports back after one invocation.
//! - [`LogSink`] / [`StatusSink`] — Fire-and-forget observability boundaries.

/// Fire-and-forget log and status-update sinks.
pub mod sink;
/// Worker invocation trait and its context/outcome types.
pub mod worker;

pub use sink::{LogEntry, LogSink, MemoryLog, MemoryStatus, NullLog, NullStatus, StatusSink};
pub use worker::{InvocationContext, InvocationOutcome, WorkerInvocation};

// --- Error types ---

/// Top-level error type for the Ritmo scheduler.
#[derive(Debug, thiserror::Error)]
pub enum RitmoError {
    /// An error originating in the loop controller.
    #[error("Controller error: {0}")]
    Controller(String),

    /// A task was submitted with an unrecognized priority class.
    #[error("Invalid priority class: '{0}'")]
    InvalidPriority(String),

    /// A worker invocation exceeded its enforced timeout.
    #[error("Worker '{worker}' timed out after {timeout_ms}ms")]
    WorkerTimeout {
        /// Name of the worker that timed out.
        worker: String,
        /// The enforced bound, in milliseconds.
        timeout_ms: u64,
    },

    /// A dispatch or hand-off referenced a worker that is not registered.
    #[error("Worker '{0}' not found")]
    WorkerNotFound(String),

    /// A serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An IO failure (journal file, metrics snapshot).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across all Ritmo crates.
pub type RitmoResult<T> = Result<T, RitmoError>;
