//! Stop endpoints.
//!
//! - GET /api/stops - All stops by route and position, each with its route
//! - GET /api/stops/:id - One stop with its route
//! - POST /api/stops - Add a stop (admin)
//! - PUT /api/stops/:id - Update a stop (admin)
//! - DELETE /api/stops/:id - Remove a stop (admin)

use super::{MessageResponse, Relations};
use crate::auth::{AuthUser, RequireAdmin};
use crate::server::state::AppState;
use crate::types::{Id, NewStop, Route, Stop};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use busdesk_web::{validation::FieldErrors, AppError, JsonBody};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Stop fields. All required on create, all optional on update.
#[derive(Debug, Deserialize)]
pub struct StopRequest {
    /// Owning route (must exist)
    pub route_id: Option<Id>,
    /// Stop name, at most 100 characters
    pub stop_name: Option<String>,
    /// Position along the route, from 1
    pub stop_order: Option<i64>,
}

/// A stop with its route.
#[derive(Debug, Serialize)]
pub struct StopWithRoute {
    /// The stop
    #[serde(flatten)]
    pub stop: Stop,
    /// Its route
    pub route: Option<Route>,
}

/// Response after creating or updating a stop.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// Success message
    pub message: &'static str,
    /// The stored stop
    pub data: Stop,
}

#[derive(Default)]
struct StopChanges {
    route_id: Option<Id>,
    stop_name: Option<String>,
    stop_order: Option<i32>,
}

async fn validate_stop(
    state: &AppState,
    req: StopRequest,
    creating: bool,
) -> Result<StopChanges, AppError> {
    let mut errors = FieldErrors::new();
    let mut changes = StopChanges::default();

    let route_id = if creating {
        errors.required("route_id", req.route_id)
    } else {
        req.route_id
    };
    if let Some(route_id) = route_id {
        if state.store.get_route(route_id).await?.is_some() {
            changes.route_id = Some(route_id);
        } else {
            errors.invalid_selection("route_id");
        }
    }

    let stop_name = if creating {
        errors.required_str("stop_name", req.stop_name)
    } else {
        FieldErrors::optional_str(req.stop_name)
    };
    changes.stop_name = stop_name.filter(|name| errors.max_len("stop_name", name, 100));

    let stop_order = if creating {
        errors.required("stop_order", req.stop_order)
    } else {
        req.stop_order
    };
    if let Some(order) = stop_order {
        if errors.min_int("stop_order", order, 1) {
            match i32::try_from(order) {
                Ok(order) => changes.stop_order = Some(order),
                Err(_) => errors.add("stop_order", "The stop order is too large."),
            }
        }
    }

    errors.into_result()?;
    Ok(changes)
}

async fn find_stop(state: &AppState, id: Id) -> Result<Stop, AppError> {
    state
        .store
        .get_stop(id)
        .await?
        .ok_or_else(|| AppError::not_found("Stop", id))
}

// ============================================================================
// Handlers
// ============================================================================

/// List every stop ordered by route, then position.
///
/// # Errors
///
/// Returns 401 without a token, 500 on storage failure.
pub async fn list_stops(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<StopWithRoute>>, AppError> {
    let stops = state.store.list_stops().await?;
    let mut relations = Relations::new(state.store.as_ref());

    let mut out = Vec::with_capacity(stops.len());
    for stop in stops {
        let route = relations.route(stop.route_id).await?;
        out.push(StopWithRoute { stop, route });
    }
    Ok(Json(out))
}

/// One stop with its route.
///
/// # Errors
///
/// Returns 404 when the stop does not exist.
pub async fn get_stop(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<StopWithRoute>, AppError> {
    let stop = find_stop(&state, id).await?;
    let route = state.store.get_route(stop.route_id).await?;
    Ok(Json(StopWithRoute { stop, route }))
}

/// Add a stop to a route.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/stops \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"route_id": 1, "stop_name": "Kwekwe", "stop_order": 2}'
/// ```
///
/// # Errors
///
/// Returns 422 on field errors, including an unknown route.
pub async fn create_stop(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<StopRequest>,
) -> Result<(StatusCode, Json<StopResponse>), AppError> {
    let changes = validate_stop(&state, req, true).await?;
    let (Some(route_id), Some(stop_name), Some(stop_order)) =
        (changes.route_id, changes.stop_name, changes.stop_order)
    else {
        return Err(AppError::validation("The given data was invalid."));
    };

    let stop = state
        .store
        .create_stop(
            NewStop {
                route_id,
                stop_name,
                stop_order,
            },
            state.now(),
        )
        .await?;

    tracing::info!(stop_id = stop.id, route_id, "Stop added");
    Ok((
        StatusCode::CREATED,
        Json(StopResponse {
            message: "Stop created successfully.",
            data: stop,
        }),
    ))
}

/// Update a stop. Only supplied fields change.
///
/// # Errors
///
/// Returns 404 when the stop does not exist, 422 on field errors.
pub async fn update_stop(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
    JsonBody(req): JsonBody<StopRequest>,
) -> Result<Json<StopResponse>, AppError> {
    let mut stop = find_stop(&state, id).await?;
    let changes = validate_stop(&state, req, false).await?;

    if let Some(route_id) = changes.route_id {
        stop.route_id = route_id;
    }
    if let Some(name) = changes.stop_name {
        stop.stop_name = name;
    }
    if let Some(order) = changes.stop_order {
        stop.stop_order = order;
    }
    stop.updated_at = state.now();

    let stop = state.store.update_stop(&stop).await?;
    tracing::info!(stop_id = stop.id, "Stop updated");
    Ok(Json(StopResponse {
        message: "Stop updated successfully.",
        data: stop,
    }))
}

/// Remove a stop.
///
/// # Errors
///
/// Returns 404 when the stop does not exist.
pub async fn delete_stop(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<MessageResponse>, AppError> {
    find_stop(&state, id).await?;
    state.store.delete_stop(id).await?;
    tracing::info!(stop_id = id, "Stop deleted");
    Ok(Json(MessageResponse::new("Stop deleted successfully.")))
}
