use axum::extract::State;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::v1::response::ApiResponse;

/// Health data returned inside the v1 envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub players: usize,
    pub credential_configured: bool,
    pub auto_refresh: bool,
    pub history_years: u32,
    pub pending_rechecks: usize,
}

/// `GET /api/v1/health`
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthData> {
    let tracker = &state.config.tracker;

    ApiResponse::success(HealthData {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        players: state.cache.list().await.len(),
        credential_configured: tracker.has_credential(),
        auto_refresh: tracker.auto_refresh,
        history_years: tracker.history_years,
        pending_rechecks: state.cache.guard().pending_rechecks(),
    })
}
