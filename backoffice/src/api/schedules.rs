//! Timetable endpoints.
//!
//! - GET /api/schedules - All schedules, newest first, with route, bus, and statistics
//! - GET /api/schedules/:id - One schedule with route and bus
//! - POST /api/schedules - Add a schedule (admin)
//! - PUT /api/schedules/:id - Update a schedule (admin)
//! - DELETE /api/schedules/:id - Remove a schedule (admin)

use super::{MessageResponse, Relations};
use crate::auth::{AuthUser, RequireAdmin};
use crate::server::state::AppState;
use crate::types::{
    parse_datetime, Bus, Id, Money, NewSchedule, Route, Schedule, ScheduleStatus, DATETIME_FORMAT,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use busdesk_web::{validation::FieldErrors, AppError, JsonBody};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ARRIVAL_AFTER_DEPARTURE: &str = "The arrival time must be a date after departure time.";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Schedule fields. Route, bus, and both times are required on create.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    /// Route served (must exist)
    pub route_id: Option<Id>,
    /// Bus assigned (must exist)
    pub bus_id: Option<Id>,
    /// Departure date-time
    pub departure_time: Option<String>,
    /// Arrival date-time, after departure
    pub arrival_time: Option<String>,
    /// Fare, at least 0
    pub price: Option<f64>,
    /// `scheduled` or `cancelled`
    pub status: Option<String>,
}

/// A schedule with its route and bus.
#[derive(Debug, Serialize)]
pub struct ScheduleWithRelations {
    /// The schedule
    #[serde(flatten)]
    pub schedule: Schedule,
    /// Route served
    pub route: Option<Route>,
    /// Bus assigned
    pub bus: Option<Bus>,
}

/// Timetable totals.
#[derive(Debug, Serialize)]
pub struct ScheduleStatistics {
    /// Schedules in total
    pub total_schedules: usize,
    /// Schedules per status
    pub status_counts: BTreeMap<&'static str, usize>,
    /// Departure of the newest schedule
    pub latest_departure: Option<String>,
    /// Arrival of the newest schedule
    pub latest_arrival: Option<String>,
}

impl ScheduleStatistics {
    /// `schedules` must be newest first.
    fn from_schedules(schedules: &[Schedule]) -> Self {
        let mut status_counts = BTreeMap::new();
        for schedule in schedules {
            *status_counts.entry(schedule.status.as_str()).or_insert(0) += 1;
        }
        let newest = schedules.first();
        Self {
            total_schedules: schedules.len(),
            status_counts,
            latest_departure: newest.map(|s| s.departure_time.format(DATETIME_FORMAT).to_string()),
            latest_arrival: newest.map(|s| s.arrival_time.format(DATETIME_FORMAT).to_string()),
        }
    }
}

/// Response for listing schedules.
#[derive(Debug, Serialize)]
pub struct ListSchedulesResponse {
    /// Every schedule, newest first
    pub schedules: Vec<ScheduleWithRelations>,
    /// Timetable totals
    pub statistics: ScheduleStatistics,
}

/// Response after creating or updating a schedule.
#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    /// Success message
    pub message: &'static str,
    /// The stored schedule
    pub data: Schedule,
}

#[derive(Default)]
struct ScheduleChanges {
    route_id: Option<Id>,
    bus_id: Option<Id>,
    departure_time: Option<NaiveDateTime>,
    arrival_time: Option<NaiveDateTime>,
    price: Option<Money>,
    status: Option<ScheduleStatus>,
}

fn date_field(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<NaiveDateTime> {
    let value = value?;
    let parsed = parse_datetime(&value);
    if parsed.is_none() {
        errors.add(
            field,
            format!("The {} is not a valid date.", busdesk_web::validation::label(field)),
        );
    }
    parsed
}

/// Validate a schedule body. `current` is the schedule being updated; the
/// arrival check falls back to its stored times for whichever side is absent.
async fn validate_schedule(
    state: &AppState,
    req: ScheduleRequest,
    current: Option<&Schedule>,
) -> Result<ScheduleChanges, AppError> {
    let mut errors = FieldErrors::new();
    let creating = current.is_none();
    let mut changes = ScheduleChanges::default();

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

    let bus_id = if creating {
        errors.required("bus_id", req.bus_id)
    } else {
        req.bus_id
    };
    if let Some(bus_id) = bus_id {
        if state.store.get_bus(bus_id).await?.is_some() {
            changes.bus_id = Some(bus_id);
        } else {
            errors.invalid_selection("bus_id");
        }
    }

    let (departure, arrival) = if creating {
        (
            errors.required_str("departure_time", req.departure_time),
            errors.required_str("arrival_time", req.arrival_time),
        )
    } else {
        (
            FieldErrors::optional_str(req.departure_time),
            FieldErrors::optional_str(req.arrival_time),
        )
    };
    changes.departure_time = date_field(&mut errors, "departure_time", departure);
    changes.arrival_time = date_field(&mut errors, "arrival_time", arrival);

    if let Some(arrival) = changes.arrival_time {
        let departure = changes
            .departure_time
            .or_else(|| current.map(|s| s.departure_time));
        if departure.is_some_and(|departure| arrival <= departure) {
            errors.add("arrival_time", ARRIVAL_AFTER_DEPARTURE);
        }
    } else if let (Some(departure), Some(current)) = (changes.departure_time, current) {
        if current.arrival_time <= departure {
            errors.add("arrival_time", ARRIVAL_AFTER_DEPARTURE);
        }
    }

    if let Some(price) = req.price {
        if errors.min_number("price", price, 0.0) {
            match Money::from_major(price) {
                Some(price) => changes.price = Some(price),
                None => errors.add("price", "The price is too large."),
            }
        }
    }

    changes.status = req
        .status
        .and_then(|s| errors.one_of::<ScheduleStatus>("status", s.trim()));

    errors.into_result()?;
    Ok(changes)
}

async fn find_schedule(state: &AppState, id: Id) -> Result<Schedule, AppError> {
    state
        .store
        .get_schedule(id)
        .await?
        .ok_or_else(|| AppError::not_found("Schedule", id))
}

async fn with_relations(
    relations: &mut Relations<'_>,
    schedule: Schedule,
) -> Result<ScheduleWithRelations, AppError> {
    let route = relations.route(schedule.route_id).await?;
    let bus = relations.bus(schedule.bus_id).await?;
    Ok(ScheduleWithRelations {
        schedule,
        route,
        bus,
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// List every schedule, newest first, with timetable totals.
///
/// # Errors
///
/// Returns 401 without a token, 500 on storage failure.
pub async fn list_schedules(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ListSchedulesResponse>, AppError> {
    let schedules = state.store.list_schedules().await?;
    let statistics = ScheduleStatistics::from_schedules(&schedules);

    let mut relations = Relations::new(state.store.as_ref());
    let mut out = Vec::with_capacity(schedules.len());
    for schedule in schedules {
        out.push(with_relations(&mut relations, schedule).await?);
    }

    Ok(Json(ListSchedulesResponse {
        schedules: out,
        statistics,
    }))
}

/// One schedule with its route and bus.
///
/// # Errors
///
/// Returns 404 when the schedule does not exist.
pub async fn get_schedule(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<ScheduleWithRelations>, AppError> {
    let schedule = find_schedule(&state, id).await?;
    let mut relations = Relations::new(state.store.as_ref());
    Ok(Json(with_relations(&mut relations, schedule).await?))
}

/// Add a schedule.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/schedules \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "route_id": 1, "bus_id": 1,
///     "departure_time": "2025-09-01 06:30:00", "arrival_time": "2025-09-01 12:00:00",
///     "price": 25.0
///   }'
/// ```
///
/// # Errors
///
/// Returns 422 on field errors.
pub async fn create_schedule(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), AppError> {
    let changes = validate_schedule(&state, req, None).await?;
    let (Some(route_id), Some(bus_id), Some(departure_time), Some(arrival_time)) = (
        changes.route_id,
        changes.bus_id,
        changes.departure_time,
        changes.arrival_time,
    ) else {
        return Err(AppError::validation("The given data was invalid."));
    };

    let schedule = state
        .store
        .create_schedule(
            NewSchedule {
                route_id,
                bus_id,
                departure_time,
                arrival_time,
                price: changes.price,
                status: changes.status.unwrap_or_default(),
            },
            state.now(),
        )
        .await?;

    tracing::info!(schedule_id = schedule.id, route_id, bus_id, "Schedule added");
    Ok((
        StatusCode::CREATED,
        Json(ScheduleResponse {
            message: "Schedule created",
            data: schedule,
        }),
    ))
}

/// Update a schedule. Only supplied fields change.
///
/// # Errors
///
/// Returns 404 when the schedule does not exist, 422 on field errors.
pub async fn update_schedule(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
    JsonBody(req): JsonBody<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, AppError> {
    let mut schedule = find_schedule(&state, id).await?;
    let changes = validate_schedule(&state, req, Some(&schedule)).await?;

    if let Some(route_id) = changes.route_id {
        schedule.route_id = route_id;
    }
    if let Some(bus_id) = changes.bus_id {
        schedule.bus_id = bus_id;
    }
    if let Some(departure) = changes.departure_time {
        schedule.departure_time = departure;
    }
    if let Some(arrival) = changes.arrival_time {
        schedule.arrival_time = arrival;
    }
    if let Some(price) = changes.price {
        schedule.price = Some(price);
    }
    if let Some(status) = changes.status {
        schedule.status = status;
    }
    schedule.updated_at = state.now();

    let schedule = state.store.update_schedule(&schedule).await?;
    tracing::info!(schedule_id = schedule.id, status = %schedule.status, "Schedule updated");
    Ok(Json(ScheduleResponse {
        message: "Schedule updated",
        data: schedule,
    }))
}

/// Remove a schedule.
///
/// # Errors
///
/// Returns 404 when the schedule does not exist.
pub async fn delete_schedule(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<MessageResponse>, AppError> {
    find_schedule(&state, id).await?;
    state.store.delete_schedule(id).await?;
    tracing::info!(schedule_id = id, "Schedule deleted");
    Ok(Json(MessageResponse::new("Schedule deleted")))
}
