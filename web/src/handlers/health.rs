//! Health check endpoints.
//!
//! Used by load balancers and orchestrators to verify service health.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use std::collections::BTreeMap;

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Simple health check endpoint (for basic liveness).
///
/// Does NOT check dependencies.
///
/// ```text
/// GET /health
/// {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// True when every dependency answered
    pub ready: bool,
    /// Per-dependency result
    pub checks: BTreeMap<&'static str, bool>,
}

/// Build a readiness response from named dependency checks.
///
/// Answers 503 Service Unavailable when any check failed.
#[must_use]
pub fn readiness_response(checks: &[(&'static str, bool)]) -> (StatusCode, Json<ReadinessResponse>) {
    let ready = checks.iter().all(|(_, ok)| *ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            checks: checks.iter().copied().collect(),
        }),
    )
}
