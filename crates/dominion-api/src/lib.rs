//! # dominion-api
//!
//! Thin HTTP surface over the territory engine. User identity comes from the
//! path; authentication is not handled here.
//!
//! | Route | |
//! |-------|--|
//! | `GET /health` | liveness |
//! | `GET /territories` | every influence entry |
//! | `GET /users/:user_id/stats` | territory summary of one user |
//! | `POST /users/:user_id/activities` | record a manual polyline |
//! | `POST /users/:user_id/import` | import the most recent page |
//! | `POST /users/:user_id/import/all` | import the full history |
//! | `GET /strava/webhook` | subscription handshake |
//! | `POST /strava/webhook` | event delivery |

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use dominion_engine::{ImportOptions, ImportOrchestrator};

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ImportOrchestrator,
    /// Paging for full imports; recent imports use the same page size.
    pub import: ImportOptions,
    /// Token expected in the webhook handshake.
    pub verify_token: Arc<str>,
}

impl AppState {
    pub fn new(
        orchestrator: ImportOrchestrator,
        import: ImportOptions,
        verify_token: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            orchestrator,
            import,
            verify_token: verify_token.into(),
        }
    }
}

/// All routes, without middleware.
pub fn router(state: AppState) -> Router {
    use handlers::{imports, territories, webhook};

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/territories", get(territories::list_territories))
        .route("/users/:user_id/stats", get(territories::user_stats))
        .route(
            "/users/:user_id/activities",
            post(territories::record_activity),
        )
        .route("/users/:user_id/import", post(imports::import_recent))
        .route("/users/:user_id/import/all", post(imports::import_all))
        .route(
            "/strava/webhook",
            get(webhook::verify_webhook).post(webhook::receive_event),
        )
        .with_state(state)
}
