use arbor_store::StoreError;
use arbor_types::Hash;

/// Errors from encoding, decoding, batching and reading values.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes that do not decode to a canonical value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Pending chunks whose referents cannot be proven present.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A ref that should resolve did not.
    #[error("missing chunk: {0}")]
    MissingChunk(Hash),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ValueError {
    /// The hashes rejected by backpressure, if this is a backpressure error.
    pub fn rejected_hashes(&self) -> Option<&[Hash]> {
        match self {
            Self::Store(StoreError::Backpressure(rejected)) => Some(rejected.as_slice()),
            _ => None,
        }
    }
}

/// Result alias for value operations.
pub type ValueResult<T> = Result<T, ValueError>;
