use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use httpmon_core::{MonitorKey, RunnerInfo};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct MonitorSummary {
    pub namespace: String,
    pub name: String,
    pub fingerprint: String,
    pub state: String,
    pub period_ms: u64,
    pub started_at: Option<String>,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub last_cycle_ok: Option<bool>,
}

impl From<RunnerInfo> for MonitorSummary {
    fn from(info: RunnerInfo) -> Self {
        Self {
            namespace: info.monitor.namespace,
            name: info.monitor.name,
            fingerprint: info.fingerprint.0,
            state: info.state.to_string(),
            period_ms: info.period_ms,
            started_at: info.started_at.map(|t| t.to_rfc3339()),
            cycles: info.cycles,
            failed_cycles: info.failed_cycles,
            last_cycle_ok: info.last_cycle.as_ref().map(|c| c.succeeded()),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/monitors", get(list_monitors))
        .route("/monitors/{namespace}/{name}", get(get_monitor))
}

/// GET /api/v1/monitors
async fn list_monitors(State(state): State<AppState>) -> Json<Vec<MonitorSummary>> {
    let runners = state.registry.list().await;
    Json(runners.into_iter().map(MonitorSummary::from).collect())
}

/// GET /api/v1/monitors/:namespace/:name
async fn get_monitor(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<RunnerInfo>, ApiError> {
    let key = MonitorKey::new(namespace, name);
    state
        .registry
        .lookup(&key)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Monitor {} not found", key)))
}
