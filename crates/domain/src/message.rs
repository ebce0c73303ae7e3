use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recognition events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One recognition update from the speech provider.
///
/// Non-final events are revisions-in-progress and are dropped by the agent;
/// only finals enter the translation fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionEvent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
    /// Detected language tag. May be empty or provider-specific (`cmn-*`).
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Translations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One STT final, fully fanned out across the target languages the active
/// outputs need.
///
/// `seq` is assigned by the agent before translation work is dispatched, so
/// it is gap-free and monotonic within a live session even though workers
/// complete out of order. An empty-string value in `texts` marks a failed
/// translation for that language; the controller skips it.
#[derive(Debug, Clone, Default)]
pub struct Translation {
    pub seq: u64,
    pub source_text: String,
    pub source_lang: String,
    pub texts: HashMap<String, String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Telemetry snapshots
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message in an output's review window, as exposed to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingView {
    pub id: u64,
    pub text: String,
    /// Whole seconds until the message fires, rounded up.
    pub remain_sec: u64,
}

/// Deep snapshot of one output's runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputStateView {
    pub name: String,
    pub paused: bool,
    pub last_text: String,
    pub pending: Vec<PendingView>,
    pub recent: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Live-status events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A live-status transition for a monitored room. Duplicate-state events
/// are permitted; the supervisor treats them as idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEvent {
    pub room_id: u64,
    pub live: bool,
    #[serde(default)]
    pub title: String,
}
