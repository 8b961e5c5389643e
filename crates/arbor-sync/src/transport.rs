use async_trait::async_trait;
use arbor_protocol::{WireRequest, WireResponse};

use crate::error::SyncResult;

/// Carries protocol requests to a remote store.
///
/// Implementations return every response the remote produced, whatever its
/// status; only failures to get a response at all are errors.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn send(&self, request: WireRequest) -> SyncResult<WireResponse>;

    /// Human-readable location of the remote, for logs.
    fn describe(&self) -> String;
}
