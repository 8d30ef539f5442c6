//! Health check endpoints for the back office.
//!
//! Liveness comes from `busdesk-web`; readiness round-trips to the database.

use super::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use busdesk_web::handlers::health::{readiness_response, ReadinessResponse};

pub use busdesk_web::handlers::health::health_check;

/// Readiness check endpoint.
///
/// Returns 200 OK when the database answers, 503 otherwise. Used by
/// orchestrator readiness checks to decide whether to route traffic here.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"ready":true,"checks":{"database":true}}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match state.store.ping().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check: database unreachable");
            false
        }
    };
    readiness_response(&[("database", database)])
}
