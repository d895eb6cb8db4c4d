//! Error taxonomy shared across the workspace.

/// Error type for term computations and their orchestration.
///
/// `Cancelled` is not a true failure: it reports that the owning waiter
/// withdrew, and is never rendered to a caller as an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FibError {
    /// The term index was missing, non-integer, or negative. Raised at
    /// the request boundary before any task exists.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The request named an algorithm this build does not provide.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The computation was cancelled before completion.
    #[error("computation cancelled")]
    Cancelled,

    /// The underlying computation failed.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Forced termination of an isolated worker did not succeed. Logged,
    /// never surfaced to a caller.
    #[error("worker termination failed: {0}")]
    WorkerTermination(String),
}
