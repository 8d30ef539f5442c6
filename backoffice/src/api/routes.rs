//! Route endpoints.
//!
//! - GET /api/routes - All routes with distance totals
//! - GET /api/routes/:id - One route
//! - POST /api/routes - Add a route (admin)
//! - PUT /api/routes/:id - Update a route (admin)
//! - DELETE /api/routes/:id - Remove a route with its stops, schedules, and trips (admin)

use super::MessageResponse;
use crate::auth::{AuthUser, RequireAdmin};
use crate::server::state::AppState;
use crate::types::{Id, NewRoute, Route};
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

/// Route fields. All required on create, all optional on update.
#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    /// Unique code, at most 20 characters
    pub route_code: Option<String>,
    /// Departure town
    pub origin: Option<String>,
    /// Arrival town
    pub destination: Option<String>,
    /// Length in kilometres, at least 0.1
    pub distance_km: Option<f64>,
    /// Free-form duration, at most 50 characters
    pub estimated_time: Option<String>,
}

/// Network totals.
#[derive(Debug, Serialize)]
pub struct RouteStatistics {
    /// Routes in total
    pub total_routes: usize,
    /// Sum of route lengths
    pub total_distance_km: f64,
    /// Mean route length; null without routes
    pub average_distance_km: Option<f64>,
}

impl RouteStatistics {
    #[allow(clippy::cast_precision_loss)]
    fn from_routes(routes: &[Route]) -> Self {
        let total_distance_km: f64 = routes.iter().map(|r| r.distance_km).sum();
        let average_distance_km =
            (!routes.is_empty()).then(|| total_distance_km / routes.len() as f64);
        Self {
            total_routes: routes.len(),
            total_distance_km,
            average_distance_km,
        }
    }
}

/// Response for listing routes.
#[derive(Debug, Serialize)]
pub struct ListRoutesResponse {
    /// Every route
    pub routes: Vec<Route>,
    /// Network totals
    pub statistics: RouteStatistics,
}

#[derive(Default)]
struct RouteChanges {
    route_code: Option<String>,
    origin: Option<String>,
    destination: Option<String>,
    distance_km: Option<f64>,
    estimated_time: Option<String>,
}

/// Validate a route body. `current` is the route being updated.
async fn validate_route(
    state: &AppState,
    req: RouteRequest,
    current: Option<&Route>,
) -> Result<RouteChanges, AppError> {
    let mut errors = FieldErrors::new();
    let creating = current.is_none();

    let text = |errors: &mut FieldErrors, field: &str, value: Option<String>, max: usize| {
        let value = if creating {
            errors.required_str(field, value)
        } else {
            FieldErrors::optional_str(value)
        };
        value.filter(|v| errors.max_len(field, v, max))
    };

    let route_code = text(&mut errors, "route_code", req.route_code, 20);
    let origin = text(&mut errors, "origin", req.origin, 100);
    let destination = text(&mut errors, "destination", req.destination, 100);
    let estimated_time = text(&mut errors, "estimated_time", req.estimated_time, 50);

    if let Some(code) = &route_code {
        let holder = state.store.find_route_by_code(code).await?;
        if holder.is_some_and(|holder| current.is_none_or(|route| route.id != holder.id)) {
            errors.taken("route_code");
        }
    }

    let distance_km = if creating {
        errors.required("distance_km", req.distance_km)
    } else {
        req.distance_km
    };
    let distance_km = distance_km.filter(|d| errors.min_number("distance_km", *d, 0.1));

    errors.into_result()?;
    Ok(RouteChanges {
        route_code,
        origin,
        destination,
        distance_km,
        estimated_time,
    })
}

async fn find_route(state: &AppState, id: Id) -> Result<Route, AppError> {
    state
        .store
        .get_route(id)
        .await?
        .ok_or_else(|| AppError::not_found("Route", id))
}

// ============================================================================
// Handlers
// ============================================================================

/// List every route with distance totals.
///
/// # Errors
///
/// Returns 401 without a token, 500 on storage failure.
pub async fn list_routes(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ListRoutesResponse>, AppError> {
    let routes = state.store.list_routes().await?;
    let statistics = RouteStatistics::from_routes(&routes);
    Ok(Json(ListRoutesResponse { routes, statistics }))
}

/// One route.
///
/// # Errors
///
/// Returns 404 when the route does not exist.
pub async fn get_route(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(find_route(&state, id).await?))
}

/// Add a route.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/routes \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "route_code": "HRE-BYO", "origin": "Harare", "destination": "Bulawayo",
///     "distance_km": 439.5, "estimated_time": "5h 30m"
///   }'
/// ```
///
/// # Errors
///
/// Returns 422 on field errors.
pub async fn create_route(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RouteRequest>,
) -> Result<(StatusCode, Json<Route>), AppError> {
    let changes = validate_route(&state, req, None).await?;
    let RouteChanges {
        route_code: Some(route_code),
        origin: Some(origin),
        destination: Some(destination),
        distance_km: Some(distance_km),
        estimated_time: Some(estimated_time),
    } = changes
    else {
        return Err(AppError::validation("The given data was invalid."));
    };

    let route = state
        .store
        .create_route(
            NewRoute {
                route_code,
                origin,
                destination,
                distance_km,
                estimated_time,
            },
            state.now(),
        )
        .await?;

    tracing::info!(route_id = route.id, route_code = %route.route_code, "Route added");
    Ok((StatusCode::CREATED, Json(route)))
}

/// Update a route. Only supplied fields change.
///
/// # Errors
///
/// Returns 404 when the route does not exist, 422 on field errors.
pub async fn update_route(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
    JsonBody(req): JsonBody<RouteRequest>,
) -> Result<Json<Route>, AppError> {
    let mut route = find_route(&state, id).await?;
    let changes = validate_route(&state, req, Some(&route)).await?;

    if let Some(code) = changes.route_code {
        route.route_code = code;
    }
    if let Some(origin) = changes.origin {
        route.origin = origin;
    }
    if let Some(destination) = changes.destination {
        route.destination = destination;
    }
    if let Some(distance_km) = changes.distance_km {
        route.distance_km = distance_km;
    }
    if let Some(estimated_time) = changes.estimated_time {
        route.estimated_time = estimated_time;
    }
    route.updated_at = state.now();

    let route = state.store.update_route(&route).await?;
    tracing::info!(route_id = route.id, "Route updated");
    Ok(Json(route))
}

/// Remove a route along with its stops, schedules, and trips.
///
/// # Errors
///
/// Returns 404 when the route does not exist.
pub async fn delete_route(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<MessageResponse>, AppError> {
    find_route(&state, id).await?;
    state.store.delete_route(id).await?;
    tracing::info!(route_id = id, "Route deleted");
    Ok(Json(MessageResponse::new("Route deleted successfully.")))
}
