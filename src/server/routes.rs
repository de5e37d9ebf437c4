use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::server::AppState;
use crate::server::handlers::{generate, generate_video, health};

/// HTTP routes, including trailing-slash aliases of the generation endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/generate/", post(generate))
        .route("/generate_video", post(generate_video))
        .route("/generate_video/", post(generate_video))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
