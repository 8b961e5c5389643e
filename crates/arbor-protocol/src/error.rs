use arbor_types::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("framing error: {0}")]
    FramingError(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("hash mismatch: frame claims {claimed}, content hashes to {actual}")]
    HashMismatch { claimed: Hash, actual: Hash },

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("compression error: {0}")]
    Compression(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
