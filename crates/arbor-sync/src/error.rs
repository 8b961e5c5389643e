use arbor_datas::DatasError;
use arbor_protocol::ProtocolError;
use arbor_store::StoreError;
use arbor_types::Hash;
use arbor_values::ValueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A chunk reachable from the pulled ref is absent where it must exist.
    #[error("missing chunk: {0}")]
    MissingChunk(Hash),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("unexpected response: {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("value error: {0}")]
    Value(#[from] ValueError),

    #[error("dataset error: {0}")]
    Datas(#[from] DatasError),
}

pub type SyncResult<T> = Result<T, SyncError>;
