use arbor_protocol::endpoints;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router for the chunk-store protocol.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route(endpoints::ROOT, get(handler::get_root).post(handler::post_root))
        .route(endpoints::WRITE_VALUE, post(handler::write_value))
        .route(endpoints::GET_REFS, post(handler::get_refs))
        .route(endpoints::HAS_REFS, post(handler::has_refs))
        .route(endpoints::GET_BLOB, get(handler::get_blob))
        .route(endpoints::HEALTH, get(handler::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
