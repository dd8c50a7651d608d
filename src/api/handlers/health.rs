//! Health check handler: reports process uptime and queue backlog.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub uptime_seconds: i64,
    pub pending_jobs: Option<u64>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = (chrono::Utc::now() - state.started_at).num_seconds();
    let pending_jobs = state.queue.pending_count().await.ok();

    Json(HealthResponse {
        success: true,
        status: "ok",
        uptime_seconds,
        pending_jobs,
    })
}
