//! Outputs API — pause/skip control and hot output reconfiguration.
//!
//! Control operations against an idle system (no live session) answer
//! `applied: false` with status 200: unknown names and stale ids are
//! no-ops, not errors, because the operator's view is always slightly
//! behind the pipeline.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use sr_domain::config::{Config, ConfigSeverity, OutputConfig};

use crate::state::AppState;

fn applied(value: bool) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "applied": value }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/outputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller() {
        Some(controller) => Json(serde_json::json!({
            "session_active": true,
            "outputs": controller.output_states(),
        })),
        // Idle: show the configured routing instead of runtime state.
        None => Json(serde_json::json!({
            "session_active": false,
            "configured": state.config.current().outputs,
        })),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/outputs/:name/toggle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn toggle_pause(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.controller().and_then(|c| c.toggle_pause(&name)) {
        Some(paused) => Json(serde_json::json!({ "applied": true, "paused": paused })),
        None => applied(false),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/outputs/:name/pause
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SetPausedBody {
    pub paused: bool,
}

pub async fn set_paused(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SetPausedBody>,
) -> impl IntoResponse {
    let done = state
        .controller()
        .map(|c| c.set_paused(&name, body.paused))
        .unwrap_or(false);
    applied(done)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/outputs/:name/show_seq
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ShowSeqBody {
    pub show_seq: bool,
}

pub async fn set_show_seq(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<ShowSeqBody>,
) -> impl IntoResponse {
    let done = state
        .controller()
        .map(|c| c.set_show_seq(&name, body.show_seq))
        .unwrap_or(false);
    applied(done)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/pending/:id/skip
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn skip_pending(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let done = state.controller().map(|c| c.skip_pending(id)).unwrap_or(false);
    applied(done)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT /api/outputs — replace the output list
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn sync(
    State(state): State<AppState>,
    Json(outputs): Json<Vec<OutputConfig>>,
) -> impl IntoResponse {
    let mut candidate: Config = (*state.config.current()).clone();
    candidate.outputs = outputs;
    if let Err(errors) = check(&candidate) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "errors": errors })),
        )
            .into_response();
    }

    // The outputs subscriber pushes the new list into the running
    // controller (if any); the stored config covers future sessions.
    state.config.replace(candidate);
    Json(serde_json::json!({
        "applied": state.controller().is_some(),
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PATCH /api/outputs/:name — in-place metadata update
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut output): Json<OutputConfig>,
) -> impl IntoResponse {
    output.name = name;
    let mut candidate: Config = (*state.config.current()).clone();
    let Some(slot) = candidate.outputs.iter_mut().find(|o| o.name == output.name) else {
        return applied(false).into_response();
    };
    *slot = output;
    if let Err(errors) = check(&candidate) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "errors": errors })),
        )
            .into_response();
    }

    state.config.replace(candidate);
    Json(serde_json::json!({
        "applied": state.controller().is_some(),
    }))
    .into_response()
}

/// Refuse-to-apply gate for hot edits: any validation *error* rejects the
/// candidate config; warnings pass.
fn check(candidate: &Config) -> Result<(), Vec<String>> {
    let errors: Vec<String> = candidate
        .validate()
        .into_iter()
        .filter(|issue| issue.severity == ConfigSeverity::Error)
        .map(|issue| issue.message)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
