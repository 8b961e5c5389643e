use arbor_types::Hash;

/// Errors from chunk store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store's pending-write bound was exceeded. Carries exactly the
    /// hashes that were not admitted; everything else in the request was.
    #[error("backpressure: {} chunk(s) not admitted", .0.len())]
    Backpressure(Vec<Hash>),

    /// The store refused the request as malformed or invalid.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Network or remote-side failure, surfaced verbatim.
    #[error("transport error: {0}")]
    Transport(String),

    /// Failure in the persistence backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
