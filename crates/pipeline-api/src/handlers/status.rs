use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use pipeline_core::CountersSnapshot;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub pipeline: String,
    pub uptime_secs: u64,
    #[serde(flatten)]
    pub counters: CountersSnapshot,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        pipeline: state.pipeline.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        counters: state.counters.snapshot(),
    })
}
