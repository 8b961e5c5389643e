use arbor_protocol::{WireRequest, WireResponse};
use arbor_sync::{RemoteTransport, SyncError, SyncResult};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::Router;
use tower::util::ServiceExt;

/// A [`RemoteTransport`] that drives a router in-process.
///
/// Requests go through the full HTTP stack minus the socket, so a remote
/// store built on it behaves exactly as one talking to a live server.
#[derive(Clone)]
pub struct RouterTransport {
    router: Router,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl RemoteTransport for RouterTransport {
    async fn send(&self, request: WireRequest) -> SyncResult<WireResponse> {
        let mut builder = Request::builder()
            .method(request.method.as_str())
            .uri(request.uri());
        if let Some(ct) = request.content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        let req = builder
            .body(Body::from(request.body))
            .map_err(|e| SyncError::TransportError(e.to_string()))?;

        let resp = match self.router.clone().oneshot(req).await {
            Ok(resp) => resp,
            Err(never) => match never {},
        };
        let status = resp.status().as_u16();
        let body = to_bytes(resp.into_body(), usize::MAX)
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))?;
        Ok(WireResponse::new(status, body))
    }

    fn describe(&self) -> String {
        "in-process router".into()
    }
}
