//! Storage traits and implementations.
//!
//! One repository trait per table, joined under [`Store`] so handlers hold a
//! single `Arc<dyn Store>`. Creates take the fields of the new row plus the
//! timestamp to stamp on it; updates take the whole entity and return the
//! stored copy.
//!
//! - [`PostgresStore`]: `sqlx` against `PostgreSQL`, the production backend
//! - [`MemoryStore`]: in-process tables for tests (feature `test-utils`)
//!
//! Referential rules are the same in both backends:
//!
//! | Parent deleted | Children |
//! |----------------|----------|
//! | route | stops, schedules, trips deleted |
//! | bus | schedules, trips deleted |
//! | trip | tickets, payments deleted |
//! | ticket | payments keep their row, `ticket_id` cleared |
//! | user | trips keep their row, `created_by` cleared; refused while tickets or payments reference the user |

use crate::types::{
    Bus, Id, NewBus, NewPayment, NewRoute, NewSchedule, NewStop, NewTicket, NewTrip, NewUser,
    Payment, PaymentStatus, Route, Schedule, Stop, Ticket, Trip, User,
};
use async_trait::async_trait;
use busdesk_auth::Role;
use busdesk_web::PageRequest;
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Storage failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The row to change does not exist.
    #[error("record not found")]
    NotFound,

    /// A uniqueness or reference rule rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The database reported an error.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be read back.
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Back-office accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert an account.
    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User>;
    /// Account by id.
    async fn get_user(&self, id: Id) -> StoreResult<Option<User>>;
    /// Account by login id.
    async fn find_user_by_staff_id(&self, staff_id: &str) -> StoreResult<Option<User>>;
    /// Account by email (exact match).
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Every staff id starting with `prefix`.
    async fn staff_ids_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
    /// Accounts holding any of `roles`, oldest first.
    async fn users_with_roles(&self, roles: &[Role]) -> StoreResult<Vec<User>>;
    /// Whether at least one admin exists.
    async fn admin_exists(&self) -> StoreResult<bool>;
    /// Overwrite an account.
    async fn update_user(&self, user: &User) -> StoreResult<User>;
    /// Remove an account.
    ///
    /// Fails with [`StoreError::Conflict`] while tickets or payments reference it.
    async fn delete_user(&self, id: Id) -> StoreResult<()>;
}

/// Revoked bearer tokens, keyed by `jti`.
#[async_trait]
pub trait TokenDenylist: Send + Sync {
    /// Revoke a token until it would have expired anyway. Entries already
    /// past their expiry at `now` are purged.
    async fn revoke_token(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Whether a token was revoked.
    async fn is_token_revoked(&self, jti: &str) -> StoreResult<bool>;
}

/// The fleet.
#[async_trait]
pub trait BusRepository: Send + Sync {
    /// Insert a bus.
    async fn create_bus(&self, bus: NewBus, now: DateTime<Utc>) -> StoreResult<Bus>;
    /// Bus by id.
    async fn get_bus(&self, id: Id) -> StoreResult<Option<Bus>>;
    /// All buses by id.
    async fn list_buses(&self) -> StoreResult<Vec<Bus>>;
    /// Bus by fleet number.
    async fn find_bus_by_number(&self, bus_number: &str) -> StoreResult<Option<Bus>>;
    /// Every fleet number starting with `prefix`.
    async fn bus_numbers_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
    /// Overwrite a bus.
    async fn update_bus(&self, bus: &Bus) -> StoreResult<Bus>;
    /// Remove a bus with its schedules and trips.
    async fn delete_bus(&self, id: Id) -> StoreResult<()>;
}

/// Routes.
#[async_trait]
pub trait RouteRepository: Send + Sync {
    /// Insert a route.
    async fn create_route(&self, route: NewRoute, now: DateTime<Utc>) -> StoreResult<Route>;
    /// Route by id.
    async fn get_route(&self, id: Id) -> StoreResult<Option<Route>>;
    /// All routes by id.
    async fn list_routes(&self) -> StoreResult<Vec<Route>>;
    /// Route by code.
    async fn find_route_by_code(&self, route_code: &str) -> StoreResult<Option<Route>>;
    /// Overwrite a route.
    async fn update_route(&self, route: &Route) -> StoreResult<Route>;
    /// Remove a route with its stops, schedules, and trips.
    async fn delete_route(&self, id: Id) -> StoreResult<()>;
}

/// Stops along routes.
#[async_trait]
pub trait StopRepository: Send + Sync {
    /// Insert a stop.
    async fn create_stop(&self, stop: NewStop, now: DateTime<Utc>) -> StoreResult<Stop>;
    /// Stop by id.
    async fn get_stop(&self, id: Id) -> StoreResult<Option<Stop>>;
    /// All stops by route, then position.
    async fn list_stops(&self) -> StoreResult<Vec<Stop>>;
    /// Overwrite a stop.
    async fn update_stop(&self, stop: &Stop) -> StoreResult<Stop>;
    /// Remove a stop.
    async fn delete_stop(&self, id: Id) -> StoreResult<()>;
}

/// Timetable.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Insert a schedule.
    async fn create_schedule(
        &self,
        schedule: NewSchedule,
        now: DateTime<Utc>,
    ) -> StoreResult<Schedule>;
    /// Schedule by id.
    async fn get_schedule(&self, id: Id) -> StoreResult<Option<Schedule>>;
    /// All schedules, newest first.
    async fn list_schedules(&self) -> StoreResult<Vec<Schedule>>;
    /// Overwrite a schedule.
    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<Schedule>;
    /// Remove a schedule.
    async fn delete_schedule(&self, id: Id) -> StoreResult<()>;
}

/// Trips.
#[async_trait]
pub trait TripRepository: Send + Sync {
    /// Insert a trip.
    async fn create_trip(&self, trip: NewTrip, now: DateTime<Utc>) -> StoreResult<Trip>;
    /// Trip by id.
    async fn get_trip(&self, id: Id) -> StoreResult<Option<Trip>>;
    /// One page of trips, newest first.
    async fn page_trips(&self, page: PageRequest) -> StoreResult<(Vec<Trip>, u64)>;
    /// Every trip code starting with `prefix`.
    async fn trip_codes_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
    /// Whether `bus_id` has a trip departing in `[start, end]`, ignoring
    /// trip `except`.
    async fn bus_has_trip_between(
        &self,
        bus_id: Id,
        start: NaiveDateTime,
        end: NaiveDateTime,
        except: Option<Id>,
    ) -> StoreResult<bool>;
    /// Overwrite a trip.
    async fn update_trip(&self, trip: &Trip) -> StoreResult<Trip>;
    /// Remove a trip with its tickets and payments.
    async fn delete_trip(&self, id: Id) -> StoreResult<()>;
}

/// Issued tickets.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Ticket by id.
    async fn get_ticket(&self, id: Id) -> StoreResult<Option<Ticket>>;
    /// One page of tickets, newest first; only `user`'s when given.
    async fn page_tickets(
        &self,
        user: Option<Id>,
        page: PageRequest,
    ) -> StoreResult<(Vec<Ticket>, u64)>;
    /// Whether a ticket code is in use.
    async fn ticket_code_exists(&self, ticket_code: &str) -> StoreResult<bool>;
    /// Seat numbers already issued on a trip.
    async fn taken_seats(&self, trip_id: Id) -> StoreResult<Vec<i32>>;
    /// Insert a ticket and link it to an unlinked payment, atomically.
    ///
    /// Fails with [`StoreError::Conflict`] when the payment was linked in the
    /// meantime or the seat was taken, and [`StoreError::NotFound`] when the
    /// payment is gone.
    async fn issue_ticket(
        &self,
        ticket: NewTicket,
        payment_id: Id,
        now: DateTime<Utc>,
    ) -> StoreResult<(Ticket, Payment)>;
    /// Remove a ticket; payments referencing it are unlinked.
    async fn delete_ticket(&self, id: Id) -> StoreResult<()>;
}

/// Payments.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Record a payment.
    async fn create_payment(&self, payment: NewPayment, now: DateTime<Utc>)
    -> StoreResult<Payment>;
    /// Payment by id.
    async fn get_payment(&self, id: Id) -> StoreResult<Option<Payment>>;
    /// All payments by id.
    async fn list_payments(&self) -> StoreResult<Vec<Payment>>;
    /// The earliest payment recorded against a ticket.
    async fn payment_for_ticket(&self, ticket_id: Id) -> StoreResult<Option<Payment>>;
    /// Change a payment's status.
    async fn update_payment_status(
        &self,
        id: Id,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Payment>;
}

/// Liveness of the backing database.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// Round-trip to the database.
    async fn ping(&self) -> StoreResult<()>;
}

/// Everything the HTTP layer needs from storage.
pub trait Store:
    UserRepository
    + TokenDenylist
    + BusRepository
    + RouteRepository
    + StopRepository
    + ScheduleRepository
    + TripRepository
    + TicketRepository
    + PaymentRepository
    + StoreHealth
{
}

impl<T> Store for T where
    T: UserRepository
        + TokenDenylist
        + BusRepository
        + RouteRepository
        + StopRepository
        + ScheduleRepository
        + TripRepository
        + TicketRepository
        + PaymentRepository
        + StoreHealth
{
}
