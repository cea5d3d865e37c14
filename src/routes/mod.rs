mod health;
mod interactions;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/commands", get(interactions::list_commands))
        .route("/interactions", post(interactions::handle_interaction))
        .route("/cache/stats", get(interactions::cache_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
