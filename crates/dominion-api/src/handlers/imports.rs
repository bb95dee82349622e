//! Bulk history imports.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use dominion_core::ImportReport;
use dominion_engine::ImportOptions;

use crate::AppState;

/// Import the most recent page of activities.
pub async fn import_recent(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let options = state.import.recent();
    respond(state.orchestrator.run(user_id, options).await)
}

/// Import the whole history (up to the configured page cap).
pub async fn import_all(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    let options: ImportOptions = state.import;
    respond(state.orchestrator.run(user_id, options).await)
}

/// The report is always the body; a failed run answers `502` since the
/// failure comes from the provider side (credential or feed).
fn respond(report: ImportReport) -> impl IntoResponse {
    let status = if report.is_completed() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(report))
}
