//! HTTP server for Arbor.
//!
//! Exposes one chunk store over the remote chunk-store protocol. Writes go
//! through a shared validating batch layer, so the store only ever holds
//! chunks whose referents it also holds.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;
pub mod transport;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::ArborServer;
pub use state::AppState;
pub use transport::RouterTransport;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let app = ArborServer::new(ServerConfig::default()).router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let app = ArborServer::new(ServerConfig::default()).router();
        let response = app
            .oneshot(Request::builder().uri("/v1/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }
}
