//! v1 Player handlers.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};

use crate::api::v1::dto::{
    ListPlayersResponse, LogEntryRequest, PlayerResponse, PlayerViewResponse,
    RefreshPlayerRequest, UpdatePlayerRequest, ViewPlayerQuery,
};
use crate::api::v1::response::{ApiResponse, ErrorCode, ResponseMeta};
use crate::api::AppState;

/// `GET /api/v1/players`
pub async fn list_players(State(state): State<AppState>) -> ApiResponse<ListPlayersResponse> {
    let players: Vec<PlayerResponse> = state
        .tracker
        .list()
        .await
        .into_iter()
        .map(Into::into)
        .collect();
    let total = players.len() as u64;

    ApiResponse::success_with_meta(
        ListPlayersResponse { players },
        ResponseMeta { total: Some(total) },
    )
}

/// `GET /api/v1/players/{id}`
///
/// Refreshes first when the cached stats are stale and auto-refresh is on.
pub async fn get_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ViewPlayerQuery>,
) -> ApiResponse<PlayerViewResponse> {
    match state.tracker.view(&id, query.name.as_deref()).await {
        Ok(view) => ApiResponse::success(view.into()),
        Err(e) => e.into(),
    }
}

/// `POST /api/v1/players/{id}/refresh`
pub async fn refresh_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResponse<PlayerResponse> {
    let req: RefreshPlayerRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RefreshPlayerRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                return ApiResponse::error(
                    ErrorCode::InvalidRequest,
                    format!("Invalid refresh request: {e}"),
                )
            }
        }
    };

    match state
        .tracker
        .refresh(Some(&id), req.name.as_deref(), req.overrides())
        .await
    {
        Ok(record) => ApiResponse::success(record.into()),
        Err(e) => e.into(),
    }
}

/// `PATCH /api/v1/players/{id}`
pub async fn update_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(req): axum::Json<UpdatePlayerRequest>,
) -> ApiResponse<PlayerResponse> {
    if req.name.is_none() && req.notes.is_none() && req.marked.is_none() {
        return ApiResponse::error(
            ErrorCode::InvalidRequest,
            "At least one of name, notes or marked is required",
        );
    }

    match state.tracker.update(&id, req.into()).await {
        Ok(record) => ApiResponse::success(record.into()),
        Err(e) => e.into(),
    }
}

/// `POST /api/v1/players/{id}/entries`
pub async fn log_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(req): axum::Json<LogEntryRequest>,
) -> ApiResponse<PlayerResponse> {
    match state
        .tracker
        .log_entry(&id, req.name.as_deref(), req.dir, req.at)
        .await
    {
        Ok(record) => ApiResponse::success(record.into()),
        Err(e) => e.into(),
    }
}

/// `DELETE /api/v1/players/{id}/entries/last`
pub async fn undo_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse<PlayerResponse> {
    match state.tracker.undo_entry(&id).await {
        Ok(record) => ApiResponse::success(record.into()),
        Err(e) => e.into(),
    }
}
