//! Strava push subscription endpoint.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use tracing::warn;

use dominion_engine::{ChallengeResponse, EventOutcome, WebhookEvent, WebhookVerification};

use crate::error::ApiError;
use crate::AppState;

/// Subscription handshake: echo the challenge when the verify token matches.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<WebhookVerification>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    match params.verify(&state.verify_token) {
        Some(echo) => Ok(Json(echo)),
        None => {
            warn!(
                subsystem = "api",
                component = "webhook",
                mode = %params.mode,
                "Webhook verification rejected"
            );
            Err(ApiError::Forbidden("Invalid verify token".to_string()))
        }
    }
}

/// Event delivery. Always acknowledged with `200`, unreadable payloads
/// included; the body says what happened.
pub async fn receive_event(State(state): State<AppState>, body: Bytes) -> Json<EventOutcome> {
    match WebhookEvent::from_payload(&body) {
        Ok(event) => Json(state.orchestrator.handle_event(event).await),
        Err(outcome) => {
            warn!(
                subsystem = "api",
                component = "webhook",
                payload_len = body.len(),
                "Unreadable webhook payload acknowledged"
            );
            Json(outcome)
        }
    }
}
