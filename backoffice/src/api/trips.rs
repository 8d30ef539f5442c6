//! Trip endpoints.
//!
//! - GET /api/trips - Paginated trips, newest first, with route and bus
//! - GET /api/trips/:id - One trip with route and bus
//! - POST /api/trips - Schedule a trip (admin)
//! - PUT /api/trips/:id - Update a trip (admin)
//! - DELETE /api/trips/:id - Remove a trip with its tickets and payments (admin)
//!
//! A bus may not depart twice within [`CONFLICT_WINDOW_HOURS`] hours, and a bus
//! under maintenance cannot be put on a trip.

use super::{MessageResponse, Relations};
use crate::auth::{AuthUser, RequireAdmin};
use crate::codes::next_trip_code;
use crate::metrics;
use crate::scheduling::{conflict_window, is_schedulable, CONFLICT_WINDOW_HOURS};
use crate::server::state::AppState;
use crate::types::{parse_wall_clock, Bus, Id, NewTrip, Route, Trip};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use busdesk_web::{validation::FieldErrors, AppError, JsonBody, Page, PageQuery};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const TRIPS_PER_PAGE: u32 = 10;

const BUS_IN_MAINTENANCE: &str =
    "The selected bus is currently under maintenance and cannot be scheduled.";

const BUS_DOUBLE_BOOKED: &str = "This bus is already scheduled for another trip within 3 hours of \
                                 the requested departure time. Please select a different time or bus.";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Trip fields. All required on create, all optional on update.
#[derive(Debug, Deserialize)]
pub struct TripRequest {
    /// Route driven (must exist)
    pub route_id: Option<Id>,
    /// Bus used (must exist)
    pub bus_id: Option<Id>,
    /// Departure, `YYYY-MM-DD HH:MM:SS`, after now
    pub departure_time: Option<String>,
    /// Seats offered: at least 1 on create, at least 0 on update
    pub available_seats: Option<i64>,
}

/// A trip with its route and bus.
#[derive(Debug, Serialize)]
pub struct TripWithRelations {
    /// The trip
    #[serde(flatten)]
    pub trip: Trip,
    /// Route driven
    pub route: Option<Route>,
    /// Bus used
    pub bus: Option<Bus>,
}

/// Response for listing trips.
#[derive(Debug, Serialize)]
pub struct ListTripsResponse {
    /// Success message
    pub message: &'static str,
    /// One page of trips
    pub trips: Page<TripWithRelations>,
}

/// Response carrying one trip.
#[derive(Debug, Serialize)]
pub struct TripResponse {
    /// Success message
    pub message: &'static str,
    /// The trip
    pub trip: TripWithRelations,
}

/// Validated trip fields, with the referenced rows loaded.
#[derive(Default)]
struct TripChanges {
    route: Option<Route>,
    bus: Option<Bus>,
    departure_time: Option<NaiveDateTime>,
    available_seats: Option<i32>,
}

async fn validate_trip(
    state: &AppState,
    req: TripRequest,
    creating: bool,
) -> Result<TripChanges, AppError> {
    let mut errors = FieldErrors::new();
    let mut changes = TripChanges::default();

    let route_id = if creating {
        errors.required("route_id", req.route_id)
    } else {
        req.route_id
    };
    if let Some(route_id) = route_id {
        changes.route = state.store.get_route(route_id).await?;
        if changes.route.is_none() {
            errors.invalid_selection("route_id");
        }
    }

    let bus_id = if creating {
        errors.required("bus_id", req.bus_id)
    } else {
        req.bus_id
    };
    if let Some(bus_id) = bus_id {
        changes.bus = state.store.get_bus(bus_id).await?;
        if changes.bus.is_none() {
            errors.invalid_selection("bus_id");
        }
    }

    let departure = if creating {
        errors.required_str("departure_time", req.departure_time)
    } else {
        FieldErrors::optional_str(req.departure_time)
    };
    if let Some(departure) = departure {
        match parse_wall_clock(&departure) {
            Some(departure) if departure > state.now().naive_utc() => {
                changes.departure_time = Some(departure);
            }
            Some(_) => errors.add("departure_time", "The departure time must be a date after now."),
            None => errors.add(
                "departure_time",
                "The departure time does not match the format YYYY-MM-DD HH:MM:SS.",
            ),
        }
    }

    let seats = if creating {
        errors.required("available_seats", req.available_seats)
    } else {
        req.available_seats
    };
    if let Some(seats) = seats {
        if errors.min_int("available_seats", seats, i64::from(creating)) {
            match i32::try_from(seats) {
                Ok(seats) => changes.available_seats = Some(seats),
                Err(_) => errors.add("available_seats", "The available seats is too large."),
            }
        }
    }

    errors.into_result()?;
    Ok(changes)
}

/// Refuse a bus under maintenance or one already departing near `departure`.
async fn ensure_bus_free(
    state: &AppState,
    bus: &Bus,
    departure: NaiveDateTime,
    except: Option<Id>,
) -> Result<(), AppError> {
    if !is_schedulable(bus) {
        return Err(AppError::bad_request(BUS_IN_MAINTENANCE));
    }
    let (start, end) = conflict_window(departure);
    if state
        .store
        .bus_has_trip_between(bus.id, start, end, except)
        .await?
    {
        tracing::info!(
            bus_id = bus.id,
            departure = %departure,
            window_hours = CONFLICT_WINDOW_HOURS,
            "Trip rejected: bus double-booked"
        );
        return Err(AppError::bad_request(BUS_DOUBLE_BOOKED));
    }
    Ok(())
}

async fn find_trip(state: &AppState, id: Id) -> Result<Trip, AppError> {
    state
        .store
        .get_trip(id)
        .await?
        .ok_or_else(|| AppError::not_found("Trip", id))
}

async fn with_relations(
    relations: &mut Relations<'_>,
    trip: Trip,
) -> Result<TripWithRelations, AppError> {
    let route = relations.route(trip.route_id).await?;
    let bus = relations.bus(trip.bus_id).await?;
    Ok(TripWithRelations { trip, route, bus })
}

// ============================================================================
// Handlers
// ============================================================================

/// List trips, newest first, 10 per page.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/api/trips?page=1 \
///   -H "Authorization: Bearer <token>"
/// ```
///
/// # Errors
///
/// Returns 401 without a token, 500 on storage failure.
pub async fn list_trips(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListTripsResponse>, AppError> {
    let request = query.with_per_page(TRIPS_PER_PAGE);
    let (trips, total) = state.store.page_trips(request).await?;

    let mut relations = Relations::new(state.store.as_ref());
    let mut data = Vec::with_capacity(trips.len());
    for trip in trips {
        data.push(with_relations(&mut relations, trip).await?);
    }

    Ok(Json(ListTripsResponse {
        message: "Trips retrieved successfully.",
        trips: Page::new(data, request, total),
    }))
}

/// One trip with its route and bus.
///
/// # Errors
///
/// Returns 404 when the trip does not exist.
pub async fn get_trip(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<TripResponse>, AppError> {
    let trip = find_trip(&state, id).await?;
    let mut relations = Relations::new(state.store.as_ref());
    Ok(Json(TripResponse {
        message: "Trip details retrieved successfully.",
        trip: with_relations(&mut relations, trip).await?,
    }))
}

/// Schedule a trip.
///
/// The trip code continues the route's `{route_code}-NNN` sequence. The
/// calling admin is recorded as the creator.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/trips \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{"route_id": 1, "bus_id": 1, "departure_time": "2025-09-01 06:30:00", "available_seats": 60}'
/// ```
///
/// # Errors
///
/// - 422 on field errors, including a departure not after now
/// - 400 when the bus is under maintenance or already departs within the window
pub async fn create_trip(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TripRequest>,
) -> Result<(StatusCode, Json<TripResponse>), AppError> {
    let changes = validate_trip(&state, req, true).await?;
    let (Some(route), Some(bus), Some(departure_time), Some(available_seats)) = (
        changes.route,
        changes.bus,
        changes.departure_time,
        changes.available_seats,
    ) else {
        return Err(AppError::validation("The given data was invalid."));
    };

    ensure_bus_free(&state, &bus, departure_time, None).await?;

    let prefix = format!("{}-", route.route_code);
    let existing = state.store.trip_codes_with_prefix(&prefix).await?;
    let trip_code = next_trip_code(&route.route_code, existing.iter().map(String::as_str));

    let trip = state
        .store
        .create_trip(
            NewTrip {
                route_id: route.id,
                bus_id: bus.id,
                created_by: Some(admin.user.id),
                trip_code,
                departure_time,
                available_seats,
            },
            state.now(),
        )
        .await?;

    metrics::record_trip_created();
    tracing::info!(
        trip_id = trip.id,
        trip_code = %trip.trip_code,
        bus_id = bus.id,
        created_by = admin.user.id,
        "Trip scheduled"
    );

    Ok((
        StatusCode::CREATED,
        Json(TripResponse {
            message: "Trip created successfully!",
            trip: TripWithRelations {
                trip,
                route: Some(route),
                bus: Some(bus),
            },
        }),
    ))
}

/// Update a trip. Only supplied fields change.
///
/// Changing the bus or the departure re-runs the maintenance and
/// double-booking checks, ignoring this trip itself.
///
/// # Errors
///
/// - 404 when the trip does not exist
/// - 422 on field errors
/// - 400 when the bus is under maintenance or already departs within the window
pub async fn update_trip(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
    JsonBody(req): JsonBody<TripRequest>,
) -> Result<Json<TripResponse>, AppError> {
    let mut trip = find_trip(&state, id).await?;
    let changes = validate_trip(&state, req, false).await?;

    if changes.bus.is_some() || changes.departure_time.is_some() {
        let bus = match changes.bus.clone() {
            Some(bus) => bus,
            None => state
                .store
                .get_bus(trip.bus_id)
                .await?
                .ok_or_else(|| AppError::not_found("Bus", trip.bus_id))?,
        };
        let departure = changes.departure_time.unwrap_or(trip.departure_time);
        ensure_bus_free(&state, &bus, departure, Some(trip.id)).await?;
    }

    if let Some(route) = &changes.route {
        trip.route_id = route.id;
    }
    if let Some(bus) = &changes.bus {
        trip.bus_id = bus.id;
    }
    if let Some(departure) = changes.departure_time {
        trip.departure_time = departure;
    }
    if let Some(seats) = changes.available_seats {
        trip.available_seats = seats;
    }
    trip.updated_at = state.now();

    let trip = state.store.update_trip(&trip).await?;
    tracing::info!(trip_id = trip.id, "Trip updated");

    let mut relations = Relations::new(state.store.as_ref());
    Ok(Json(TripResponse {
        message: "Trip updated successfully!",
        trip: with_relations(&mut relations, trip).await?,
    }))
}

/// Remove a trip along with its tickets and payments.
///
/// # Errors
///
/// Returns 404 when the trip does not exist.
pub async fn delete_trip(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<MessageResponse>, AppError> {
    find_trip(&state, id).await?;
    state.store.delete_trip(id).await?;
    tracing::info!(trip_id = id, "Trip deleted");
    Ok(Json(MessageResponse::new("Trip deleted successfully!")))
}
