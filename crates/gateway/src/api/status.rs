//! Status API — health probe and pipeline snapshot.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /healthz
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let controller = state.controller();
    let outputs = controller
        .as_ref()
        .map(|c| c.output_states())
        .unwrap_or_default();
    let all_paused = controller.as_ref().map(|c| c.is_any_paused()).unwrap_or(false);

    Json(serde_json::json!({
        "live": state.live(),
        "session_active": controller.is_some(),
        "all_paused": all_paused,
        "outputs": outputs,
    }))
}
