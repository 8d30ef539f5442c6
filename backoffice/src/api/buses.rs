//! Fleet endpoints.
//!
//! - GET /api/buses - All buses with statistics
//! - GET /api/buses/:id - One bus
//! - POST /api/buses - Add a bus (admin)
//! - PUT /api/buses/:id - Update a bus (admin)
//! - DELETE /api/buses/:id - Remove a bus with its schedules and trips (admin)

use super::MessageResponse;
use crate::auth::{AuthUser, RequireAdmin};
use crate::codes::{next_bus_number, BUS_NUMBER_PREFIX};
use crate::server::state::AppState;
use crate::types::{Bus, BusStatus, BusType, Id, NewBus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use busdesk_web::{validation::FieldErrors, AppError, JsonBody};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Bus fields. All optional on update; `type` and `capacity` required on create.
#[derive(Debug, Deserialize)]
pub struct BusRequest {
    /// Fleet number (unique, at most 50 characters); generated when absent
    pub bus_number: Option<String>,
    /// `AC`, `Non-AC`, `Sleeper`, or `Seater`
    #[serde(rename = "type")]
    pub bus_type: Option<String>,
    /// Seats, at least 1
    pub capacity: Option<i64>,
    /// `active` or `maintenance`
    pub status: Option<String>,
}

/// Fleet totals.
#[derive(Debug, Serialize)]
pub struct BusStatistics {
    /// Buses in total
    pub total_buses: usize,
    /// Buses per status
    pub status_counts: BTreeMap<&'static str, usize>,
    /// Buses per body type
    pub type_counts: BTreeMap<&'static str, usize>,
}

impl BusStatistics {
    fn from_buses(buses: &[Bus]) -> Self {
        let mut status_counts = BTreeMap::new();
        let mut type_counts = BTreeMap::new();
        for bus in buses {
            *status_counts.entry(bus.status.as_str()).or_insert(0) += 1;
            *type_counts.entry(bus.bus_type.as_str()).or_insert(0) += 1;
        }
        Self {
            total_buses: buses.len(),
            status_counts,
            type_counts,
        }
    }
}

/// Response for listing buses.
#[derive(Debug, Serialize)]
pub struct ListBusesResponse {
    /// Every bus
    pub buses: Vec<Bus>,
    /// Fleet totals
    pub statistics: BusStatistics,
}

/// Parsed and checked bus fields.
#[derive(Default)]
struct BusChanges {
    bus_number: Option<String>,
    bus_type: Option<BusType>,
    capacity: Option<i32>,
    status: Option<BusStatus>,
}

/// Validate a bus body. `current` is the bus being updated.
async fn validate_bus(
    state: &AppState,
    req: BusRequest,
    current: Option<&Bus>,
) -> Result<BusChanges, AppError> {
    let mut errors = FieldErrors::new();
    let mut changes = BusChanges::default();

    if let Some(number) = FieldErrors::optional_str(req.bus_number) {
        if errors.max_len("bus_number", &number, 50) {
            let holder = state.store.find_bus_by_number(&number).await?;
            if holder.is_some_and(|holder| current.is_none_or(|bus| bus.id != holder.id)) {
                errors.taken("bus_number");
            }
        }
        changes.bus_number = Some(number);
    }

    let bus_type = if current.is_some() {
        req.bus_type
    } else {
        errors.required_str("type", req.bus_type)
    };
    changes.bus_type = bus_type.and_then(|t| errors.one_of::<BusType>("type", t.trim()));

    let capacity = if current.is_some() {
        req.capacity
    } else {
        errors.required("capacity", req.capacity)
    };
    if let Some(capacity) = capacity {
        if errors.min_int("capacity", capacity, 1) {
            match i32::try_from(capacity) {
                Ok(capacity) => changes.capacity = Some(capacity),
                Err(_) => errors.add("capacity", "The capacity is too large."),
            }
        }
    }

    changes.status = req
        .status
        .and_then(|s| errors.one_of::<BusStatus>("status", s.trim()));

    errors.into_result()?;
    Ok(changes)
}

async fn find_bus(state: &AppState, id: Id) -> Result<Bus, AppError> {
    state
        .store
        .get_bus(id)
        .await?
        .ok_or_else(|| AppError::not_found("Bus", id))
}

// ============================================================================
// Handlers
// ============================================================================

/// List every bus with fleet totals.
///
/// # Errors
///
/// Returns 401 without a token, 500 on storage failure.
pub async fn list_buses(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ListBusesResponse>, AppError> {
    let buses = state.store.list_buses().await?;
    let statistics = BusStatistics::from_buses(&buses);
    Ok(Json(ListBusesResponse { buses, statistics }))
}

/// One bus.
///
/// # Errors
///
/// Returns 404 when the bus does not exist.
pub async fn get_bus(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<Bus>, AppError> {
    Ok(Json(find_bus(&state, id).await?))
}

/// Add a bus.
///
/// Without a `bus_number` the next free `BUS-NNN` is assigned.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/buses \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"type": "AC", "capacity": 60}'
/// ```
///
/// # Errors
///
/// Returns 422 on field errors.
pub async fn create_bus(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BusRequest>,
) -> Result<(StatusCode, Json<Bus>), AppError> {
    let changes = validate_bus(&state, req, None).await?;
    let (Some(bus_type), Some(capacity)) = (changes.bus_type, changes.capacity) else {
        return Err(AppError::validation("The given data was invalid."));
    };

    let bus_number = match changes.bus_number {
        Some(number) => number,
        None => {
            let prefix = format!("{BUS_NUMBER_PREFIX}-");
            let existing = state.store.bus_numbers_with_prefix(&prefix).await?;
            next_bus_number(existing.iter().map(String::as_str))
        }
    };

    let bus = state
        .store
        .create_bus(
            NewBus {
                bus_number,
                bus_type,
                capacity,
                status: changes.status.unwrap_or_default(),
            },
            state.now(),
        )
        .await?;

    tracing::info!(bus_id = bus.id, bus_number = %bus.bus_number, "Bus added");
    Ok((StatusCode::CREATED, Json(bus)))
}

/// Update a bus. Only supplied fields change.
///
/// # Errors
///
/// Returns 404 when the bus does not exist, 422 on field errors.
pub async fn update_bus(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
    JsonBody(req): JsonBody<BusRequest>,
) -> Result<Json<Bus>, AppError> {
    let mut bus = find_bus(&state, id).await?;
    let changes = validate_bus(&state, req, Some(&bus)).await?;

    if let Some(number) = changes.bus_number {
        bus.bus_number = number;
    }
    if let Some(bus_type) = changes.bus_type {
        bus.bus_type = bus_type;
    }
    if let Some(capacity) = changes.capacity {
        bus.capacity = capacity;
    }
    if let Some(status) = changes.status {
        bus.status = status;
    }
    bus.updated_at = state.now();

    let bus = state.store.update_bus(&bus).await?;
    tracing::info!(bus_id = bus.id, status = %bus.status, "Bus updated");
    Ok(Json(bus))
}

/// Remove a bus along with its schedules and trips.
///
/// # Errors
///
/// Returns 404 when the bus does not exist.
pub async fn delete_bus(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<MessageResponse>, AppError> {
    find_bus(&state, id).await?;
    state.store.delete_bus(id).await?;
    tracing::info!(bus_id = id, "Bus deleted");
    Ok(Json(MessageResponse::new("Bus deleted successfully.")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_statistics_group_by_status_and_type() {
        let now = Utc::now();
        let bus = |id, bus_type, status| Bus {
            id,
            bus_number: format!("BUS-{id:03}"),
            bus_type,
            capacity: 60,
            status,
            created_at: now,
            updated_at: now,
        };
        let buses = [
            bus(1, BusType::Ac, BusStatus::Active),
            bus(2, BusType::Ac, BusStatus::Maintenance),
            bus(3, BusType::Sleeper, BusStatus::Active),
        ];
        let stats = BusStatistics::from_buses(&buses);

        assert_eq!(stats.total_buses, 3);
        assert_eq!(stats.status_counts["active"], 2);
        assert_eq!(stats.status_counts["maintenance"], 1);
        assert_eq!(stats.type_counts["AC"], 2);
        assert_eq!(stats.type_counts["Sleeper"], 1);
    }
}
