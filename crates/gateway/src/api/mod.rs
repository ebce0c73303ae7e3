pub mod accounts;
pub mod outputs;
pub mod status;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the control-plane router.
///
/// Everything here is operator tooling for a locally-bound server: status
/// snapshots plus the live-session control operations (pause, skip,
/// output sync, credential rotation).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(status::health))
        .route("/api/status", get(status::status))
        .route("/api/outputs", get(outputs::list))
        .route("/api/outputs", put(outputs::sync))
        .route("/api/outputs/:name", axum::routing::patch(outputs::update))
        .route("/api/outputs/:name/toggle", post(outputs::toggle_pause))
        .route("/api/outputs/:name/pause", post(outputs::set_paused))
        .route("/api/outputs/:name/show_seq", post(outputs::set_show_seq))
        .route("/api/pending/:id/skip", post(outputs::skip_pending))
        .route("/api/accounts/:name/credentials", post(accounts::update_credentials))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
