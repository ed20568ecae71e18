//! Router assembly for the submission API.

use crate::state::AppState;
use crate::submit::submit;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Builds the submission API's router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/runs", post(submit)).layer(TraceLayer::new_for_http()).with_state(state)
}
