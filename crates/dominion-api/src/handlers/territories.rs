//! Territory queries and manual activities.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use dominion_core::{InfluenceEntry, UserStats};

use crate::error::ApiError;
use crate::AppState;

/// Every (cell, user) influence entry.
pub async fn list_territories(
    State(state): State<AppState>,
) -> Result<Json<Vec<InfluenceEntry>>, ApiError> {
    let entries = state.orchestrator.aggregator().ledger().list_all().await?;
    Ok(Json(entries))
}

pub async fn user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserStats>, ApiError> {
    let stats = state
        .orchestrator
        .aggregator()
        .ledger()
        .user_stats(user_id)
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct RecordActivityRequest {
    pub polyline: String,
}

/// Record a user-entered polyline. `201` when it was imported, `200` when it
/// was skipped for lack of geo data.
pub async fn record_activity(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<RecordActivityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .orchestrator
        .aggregator()
        .record_manual(user_id, &body.polyline)
        .await?;
    let status = if record.outcome.is_imported() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(record)))
}
