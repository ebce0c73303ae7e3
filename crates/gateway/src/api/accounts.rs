//! Accounts API — credential rotation for sender accounts.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use sr_domain::config::Credentials;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/accounts/:name/credentials
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn update_credentials(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(credentials): Json<Credentials>,
) -> impl IntoResponse {
    let mut candidate = (*state.config.current()).clone();
    let Some(account) = candidate.accounts.iter_mut().find(|a| a.name == name) else {
        return Json(serde_json::json!({ "applied": false }));
    };
    account.credentials = credentials;

    // The accounts subscriber rotates the live pool entry; the stored
    // config covers future sessions and restarts.
    state.config.replace(candidate);
    Json(serde_json::json!({ "applied": true }))
}
