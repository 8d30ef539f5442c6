//! API endpoints for the back office.
//!
//! Handlers are organized by resource:
//! - Session: admin bootstrap, login, logout, current user
//! - Users: staff and operator accounts (admin only)
//! - Buses, Routes, Stops, Schedules: catalogs (reads for any account, writes for admins)
//! - Trips: scheduled departures with conflict checks
//! - Tickets: issuance from completed payments
//! - Payments: online and counter payments
//!
//! Related rows are loaded explicitly through [`Relations`], which caches
//! each lookup for the duration of one request.

pub mod buses;
pub mod payments;
pub mod routes;
pub mod schedules;
pub mod session;
pub mod stops;
pub mod tickets;
pub mod trips;
pub mod users;

use crate::store::{Store, StoreError, StoreResult};
use crate::types::{Bus, Id, Payment, Route, Ticket, Trip, User};
use busdesk_web::AppError;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::new(
                axum::http::StatusCode::NOT_FOUND,
                "Record not found.".to_string(),
                "NOT_FOUND".to_string(),
            ),
            StoreError::Conflict(message) => Self::conflict(message),
            err @ (StoreError::Database(_) | StoreError::Internal(_)) => {
                Self::internal("An internal error occurred").with_source(anyhow::Error::new(err))
            }
        }
    }
}

/// `{ "message": ... }`
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable outcome
    pub message: &'static str,
}

impl MessageResponse {
    /// Wrap a message.
    #[must_use]
    pub const fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// A trip with its route attached.
#[derive(Debug, Clone, Serialize)]
pub struct TripWithRoute {
    /// The trip
    #[serde(flatten)]
    pub trip: Trip,
    /// Its route, if still present
    pub route: Option<Route>,
}

/// A ticket with its trip and route attached.
#[derive(Debug, Clone, Serialize)]
pub struct TicketWithTrip {
    /// The ticket
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Its trip
    pub trip: Option<TripWithRoute>,
}

async fn cached<T, F, Fut>(cache: &mut HashMap<Id, Option<T>>, id: Id, fetch: F) -> StoreResult<Option<T>>
where
    T: Clone,
    F: FnOnce(Id) -> Fut,
    Fut: Future<Output = StoreResult<Option<T>>>,
{
    if let Some(hit) = cache.get(&id) {
        return Ok(hit.clone());
    }
    let row = fetch(id).await?;
    cache.insert(id, row.clone());
    Ok(row)
}

/// Per-request cache of related rows.
pub struct Relations<'a> {
    store: &'a dyn Store,
    routes: HashMap<Id, Option<Route>>,
    buses: HashMap<Id, Option<Bus>>,
    users: HashMap<Id, Option<User>>,
    trips: HashMap<Id, Option<Trip>>,
    tickets: HashMap<Id, Option<Ticket>>,
    payments: HashMap<Id, Option<Payment>>,
}

impl<'a> Relations<'a> {
    /// Empty cache over `store`.
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            routes: HashMap::new(),
            buses: HashMap::new(),
            users: HashMap::new(),
            trips: HashMap::new(),
            tickets: HashMap::new(),
            payments: HashMap::new(),
        }
    }

    /// Route by id.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn route(&mut self, id: Id) -> StoreResult<Option<Route>> {
        let store = self.store;
        cached(&mut self.routes, id, |id| store.get_route(id)).await
    }

    /// Bus by id.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn bus(&mut self, id: Id) -> StoreResult<Option<Bus>> {
        let store = self.store;
        cached(&mut self.buses, id, |id| store.get_bus(id)).await
    }

    /// Account by id.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn user(&mut self, id: Id) -> StoreResult<Option<User>> {
        let store = self.store;
        cached(&mut self.users, id, |id| store.get_user(id)).await
    }

    /// Trip by id.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn trip(&mut self, id: Id) -> StoreResult<Option<Trip>> {
        let store = self.store;
        cached(&mut self.trips, id, |id| store.get_trip(id)).await
    }

    /// Earliest payment recorded against a ticket.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn payment_for_ticket(&mut self, ticket_id: Id) -> StoreResult<Option<Payment>> {
        let store = self.store;
        cached(&mut self.payments, ticket_id, |id| store.payment_for_ticket(id)).await
    }

    /// Trip with its route.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn trip_with_route(&mut self, id: Id) -> StoreResult<Option<TripWithRoute>> {
        let Some(trip) = self.trip(id).await? else {
            return Ok(None);
        };
        let route = self.route(trip.route_id).await?;
        Ok(Some(TripWithRoute { trip, route }))
    }

    /// Ticket by id with its trip and route.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn ticket_with_trip(&mut self, id: Id) -> StoreResult<Option<TicketWithTrip>> {
        let store = self.store;
        let Some(ticket) = cached(&mut self.tickets, id, |id| store.get_ticket(id)).await? else {
            return Ok(None);
        };
        let trip = self.trip_with_route(ticket.trip_id).await?;
        Ok(Some(TicketWithTrip { ticket, trip }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_store_errors_map_to_statuses() {
        assert_eq!(AppError::from(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(StoreError::Conflict("dup".into())).status(),
            StatusCode::CONFLICT
        );
        let internal = AppError::from(StoreError::Database("boom".into()));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.message(), "An internal error occurred");
    }
}
