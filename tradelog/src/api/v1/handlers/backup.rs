//! v1 Export/import handlers.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::api::v1::dto::{ExportQuery, ImportResponse};
use crate::api::v1::response::ApiResponse;
use crate::api::AppState;
use crate::services::export_file_name;

/// `GET /api/v1/export?format=json|csv`
///
/// Returns the raw file rather than an envelope.
pub async fn export_store(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Response {
    let format = query.format.unwrap_or_default();
    match state.backup.export(format).await {
        Ok(body) => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                export_file_name(format, Utc::now())
            );
            (
                [
                    (header::CONTENT_TYPE, format.content_type().to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => ApiResponse::<()>::from(e).into_response(),
    }
}

/// `POST /api/v1/import`
///
/// The body is a serialized store; it is always merged, never substituted.
pub async fn import_store(State(state): State<AppState>, body: String) -> ApiResponse<ImportResponse> {
    match state.backup.import_json(&body).await {
        Ok(summary) => ApiResponse::success(summary.into()),
        Err(e) => e.into(),
    }
}
