use arbor_datas::DatasError;
use arbor_protocol::body::encode_hash_lines;
use arbor_protocol::ProtocolError;
use arbor_store::StoreError;
use arbor_types::Hash;
use arbor_values::ValueError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Chunks the batch layer would not admit.
    #[error("backpressure: {} chunk(s) not admitted", .0.len())]
    Backpressure(Vec<Hash>),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("value error: {0}")]
    Value(#[from] ValueError),

    #[error("dataset error: {0}")]
    Datas(#[from] DatasError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Hashes to report in a 429 body, if this error means backpressure.
    fn rejected(&self) -> Option<&[Hash]> {
        match self {
            Self::Backpressure(h) | Self::Store(StoreError::Backpressure(h)) => Some(h.as_slice()),
            Self::Value(e) => e.rejected_hashes(),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.rejected().is_some() {
            return StatusCode::TOO_MANY_REQUESTS;
        }
        match self {
            Self::BadRequest(_) | Self::Protocol(_) | Self::Datas(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Rejected(_)) => StatusCode::BAD_REQUEST,
            Self::Value(ValueError::Decode(_) | ValueError::Validation(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Some(rejected) = self.rejected() {
            return (status, encode_hash_lines(rejected)).into_response();
        }
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let h = vec![Hash::of(b"x")];
        assert_eq!(ServerError::Backpressure(h.clone()).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ServerError::Value(ValueError::Store(StoreError::Backpressure(h))).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ServerError::BadRequest("no".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::Value(ValueError::Decode("junk".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Store(StoreError::Backend("disk".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
