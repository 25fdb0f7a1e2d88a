use thiserror::Error;

/// Error taxonomy for the index core.
///
/// `NotFound` and `QueueEmpty` are internal-only: they signal a violated
/// invariant rather than a condition a caller can trigger, and are
/// propagated rather than panicking so a broken invariant fails a test
/// instead of corrupting state silently.
#[derive(Debug, Error)]
pub enum Error {
    #[error("vector dimensions disagree: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("vector provider failed to resolve id {id}: {reason}")]
    VectorUnavailable { id: u64, reason: String },

    #[error("commit log append failed: {0}")]
    LogAppendFailure(String),

    #[error("malformed snapshot: {0}")]
    SnapshotFormat(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("node {0} referenced but not present in the index")]
    NotFound(u64),

    #[error("internal queue was empty where algorithm invariants guarantee an element")]
    QueueEmpty,
}
