//! `PostgreSQL` storage.
//!
//! Rows are read into `*Row` structs and converted into domain types, parsing
//! the text-encoded enumerations on the way. Uniqueness and foreign-key
//! violations surface as [`StoreError::Conflict`].
//!
//! # Example
//!
//! ```no_run
//! use busdesk_backoffice::config::Config;
//! use busdesk_backoffice::store::PostgresStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env();
//! let store = PostgresStore::connect(&config.database).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use super::{
    BusRepository, PaymentRepository, RouteRepository, ScheduleRepository, StopRepository,
    StoreError, StoreHealth, StoreResult, TicketRepository, TokenDenylist, TripRepository,
    UserRepository,
};
use crate::config::DatabaseConfig;
use crate::types::{
    Bus, Id, Money, NewBus, NewPayment, NewRoute, NewSchedule, NewStop, NewTicket, NewTrip,
    NewUser, Payment, PaymentStatus, Route, Schedule, Stop, Ticket, Trip, User,
};
use async_trait::async_trait;
use busdesk_auth::Role;
use busdesk_web::PageRequest;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;

/// `PostgreSQL`-backed [`Store`](super::Store).
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection can be made.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                let constraint = db_err.constraint().unwrap_or("constraint");
                return StoreError::Conflict(format!("{action}: {constraint} violated"));
            }
        }
        StoreError::Database(format!("Failed to {action}: {e}"))
    }
}

fn parse_text<T>(value: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Internal(e.to_string()))
}

fn parse_optional<T>(value: Option<String>) -> StoreResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.as_deref().map(parse_text).transpose()
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn role_names(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

// ============================================================================
// Rows
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    surname: String,
    email: String,
    address: Option<String>,
    phone: Option<String>,
    gender: Option<String>,
    password_hash: String,
    staff_id: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            surname: row.surname,
            email: row.email,
            address: row.address,
            phone: row.phone,
            gender: parse_optional(row.gender)?,
            password_hash: row.password_hash,
            staff_id: row.staff_id,
            role: parse_text(&row.role)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BusRow {
    id: i64,
    bus_number: String,
    bus_type: String,
    capacity: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BusRow> for Bus {
    type Error = StoreError;

    fn try_from(row: BusRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            bus_number: row.bus_number,
            bus_type: parse_text(&row.bus_type)?,
            capacity: row.capacity,
            status: parse_text(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: i64,
    route_code: String,
    origin: String,
    destination: String,
    distance_km: f64,
    estimated_time: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        Self {
            id: row.id,
            route_code: row.route_code,
            origin: row.origin,
            destination: row.destination,
            distance_km: row.distance_km,
            estimated_time: row.estimated_time,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StopRow {
    id: i64,
    route_id: i64,
    stop_name: String,
    stop_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StopRow> for Stop {
    fn from(row: StopRow) -> Self {
        Self {
            id: row.id,
            route_id: row.route_id,
            stop_name: row.stop_name,
            stop_order: row.stop_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: i64,
    route_id: i64,
    bus_id: i64,
    departure_time: NaiveDateTime,
    arrival_time: NaiveDateTime,
    price_cents: Option<i64>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            route_id: row.route_id,
            bus_id: row.bus_id,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            price: row.price_cents.map(Money::from_db),
            status: parse_text(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: i64,
    route_id: i64,
    bus_id: i64,
    created_by: Option<i64>,
    trip_code: String,
    departure_time: NaiveDateTime,
    available_seats: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Self {
            id: row.id,
            route_id: row.route_id,
            bus_id: row.bus_id,
            created_by: row.created_by,
            trip_code: row.trip_code,
            departure_time: row.departure_time,
            available_seats: row.available_seats,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: i64,
    trip_id: i64,
    user_id: i64,
    ticket_code: String,
    seat_number: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            ticket_code: row.ticket_code,
            seat_number: row.seat_number,
            status: parse_text(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    ticket_id: Option<i64>,
    trip_id: i64,
    user_id: i64,
    amount_cents: i64,
    method: String,
    status: String,
    transaction_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            ticket_id: row.ticket_id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            amount: Money::from_db(row.amount_cents),
            method: parse_text(&row.method)?,
            status: parse_text(&row.status)?,
            transaction_id: row.transaction_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ============================================================================
// Accounts
// ============================================================================

#[async_trait]
impl UserRepository for PostgresStore {
    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        let row: UserRow = sqlx::query_as(
            r"
            INSERT INTO users
                (name, surname, email, address, phone, gender, password_hash,
                 staff_id, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *
            ",
        )
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.email)
        .bind(&user.address)
        .bind(&user.phone)
        .bind(user.gender.map(|g| g.as_str()))
        .bind(&user.password_hash)
        .bind(&user.staff_id)
        .bind(user.role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create user"))?;
        row.try_into()
    }

    async fn get_user(&self, id: Id) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get user"))?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_staff_id(&self, staff_id: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE staff_id = $1")
            .bind(staff_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find user"))?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find user"))?;
        row.map(User::try_from).transpose()
    }

    async fn staff_ids_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        sqlx::query_scalar("SELECT staff_id FROM users WHERE left(staff_id, length($1)) = $1")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list staff ids"))
    }

    async fn users_with_roles(&self, roles: &[Role]) -> StoreResult<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT * FROM users WHERE role = ANY($1) ORDER BY id")
                .bind(role_names(roles))
                .fetch_all(&self.pool)
                .await
                .map_err(db_error("list users"))?;
        convert_all(rows)
    }

    async fn admin_exists(&self) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("check admins"))
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            UPDATE users
            SET name = $2, surname = $3, email = $4, address = $5, phone = $6,
                gender = $7, password_hash = $8, staff_id = $9, role = $10,
                updated_at = $11
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.email)
        .bind(&user.address)
        .bind(&user.phone)
        .bind(user.gender.map(|g| g.as_str()))
        .bind(&user.password_hash)
        .bind(&user.staff_id)
        .bind(user.role.as_str())
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update user"))?;
        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn delete_user(&self, id: Id) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete user"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl TokenDenylist for PostgresStore {
    async fn revoke_token(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error("purge revoked tokens"))?;

        sqlx::query(
            r"
            INSERT INTO revoked_tokens (jti, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (jti) DO NOTHING
            ",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("revoke token"))?;
        Ok(())
    }

    async fn is_token_revoked(&self, jti: &str) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = $1)")
            .bind(jti)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("check revoked token"))
    }
}

// ============================================================================
// Catalogs
// ============================================================================

#[async_trait]
impl BusRepository for PostgresStore {
    async fn create_bus(&self, bus: NewBus, now: DateTime<Utc>) -> StoreResult<Bus> {
        let row: BusRow = sqlx::query_as(
            r"
            INSERT INTO buses (bus_number, bus_type, capacity, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            ",
        )
        .bind(&bus.bus_number)
        .bind(bus.bus_type.as_str())
        .bind(bus.capacity)
        .bind(bus.status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create bus"))?;
        row.try_into()
    }

    async fn get_bus(&self, id: Id) -> StoreResult<Option<Bus>> {
        let row: Option<BusRow> = sqlx::query_as("SELECT * FROM buses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get bus"))?;
        row.map(Bus::try_from).transpose()
    }

    async fn list_buses(&self) -> StoreResult<Vec<Bus>> {
        let rows: Vec<BusRow> = sqlx::query_as("SELECT * FROM buses ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list buses"))?;
        convert_all(rows)
    }

    async fn find_bus_by_number(&self, bus_number: &str) -> StoreResult<Option<Bus>> {
        let row: Option<BusRow> = sqlx::query_as("SELECT * FROM buses WHERE bus_number = $1")
            .bind(bus_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find bus"))?;
        row.map(Bus::try_from).transpose()
    }

    async fn bus_numbers_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT bus_number FROM buses WHERE left(bus_number, length($1)) = $1",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list bus numbers"))
    }

    async fn update_bus(&self, bus: &Bus) -> StoreResult<Bus> {
        let row: Option<BusRow> = sqlx::query_as(
            r"
            UPDATE buses
            SET bus_number = $2, bus_type = $3, capacity = $4, status = $5, updated_at = $6
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(bus.id)
        .bind(&bus.bus_number)
        .bind(bus.bus_type.as_str())
        .bind(bus.capacity)
        .bind(bus.status.as_str())
        .bind(bus.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update bus"))?;
        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn delete_bus(&self, id: Id) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM buses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete bus"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl RouteRepository for PostgresStore {
    async fn create_route(&self, route: NewRoute, now: DateTime<Utc>) -> StoreResult<Route> {
        let row: RouteRow = sqlx::query_as(
            r"
            INSERT INTO routes
                (route_code, origin, destination, distance_km, estimated_time,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            ",
        )
        .bind(&route.route_code)
        .bind(&route.origin)
        .bind(&route.destination)
        .bind(route.distance_km)
        .bind(&route.estimated_time)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create route"))?;
        Ok(row.into())
    }

    async fn get_route(&self, id: Id) -> StoreResult<Option<Route>> {
        let row: Option<RouteRow> = sqlx::query_as("SELECT * FROM routes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get route"))?;
        Ok(row.map(Route::from))
    }

    async fn list_routes(&self) -> StoreResult<Vec<Route>> {
        let rows: Vec<RouteRow> = sqlx::query_as("SELECT * FROM routes ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list routes"))?;
        Ok(rows.into_iter().map(Route::from).collect())
    }

    async fn find_route_by_code(&self, route_code: &str) -> StoreResult<Option<Route>> {
        let row: Option<RouteRow> = sqlx::query_as("SELECT * FROM routes WHERE route_code = $1")
            .bind(route_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find route"))?;
        Ok(row.map(Route::from))
    }

    async fn update_route(&self, route: &Route) -> StoreResult<Route> {
        let row: Option<RouteRow> = sqlx::query_as(
            r"
            UPDATE routes
            SET route_code = $2, origin = $3, destination = $4, distance_km = $5,
                estimated_time = $6, updated_at = $7
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(route.id)
        .bind(&route.route_code)
        .bind(&route.origin)
        .bind(&route.destination)
        .bind(route.distance_km)
        .bind(&route.estimated_time)
        .bind(route.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update route"))?;
        row.map(Route::from).ok_or(StoreError::NotFound)
    }

    async fn delete_route(&self, id: Id) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete route"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl StopRepository for PostgresStore {
    async fn create_stop(&self, stop: NewStop, now: DateTime<Utc>) -> StoreResult<Stop> {
        let row: StopRow = sqlx::query_as(
            r"
            INSERT INTO stops (route_id, stop_name, stop_order, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *
            ",
        )
        .bind(stop.route_id)
        .bind(&stop.stop_name)
        .bind(stop.stop_order)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create stop"))?;
        Ok(row.into())
    }

    async fn get_stop(&self, id: Id) -> StoreResult<Option<Stop>> {
        let row: Option<StopRow> = sqlx::query_as("SELECT * FROM stops WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get stop"))?;
        Ok(row.map(Stop::from))
    }

    async fn list_stops(&self) -> StoreResult<Vec<Stop>> {
        let rows: Vec<StopRow> =
            sqlx::query_as("SELECT * FROM stops ORDER BY route_id, stop_order, id")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error("list stops"))?;
        Ok(rows.into_iter().map(Stop::from).collect())
    }

    async fn update_stop(&self, stop: &Stop) -> StoreResult<Stop> {
        let row: Option<StopRow> = sqlx::query_as(
            r"
            UPDATE stops
            SET route_id = $2, stop_name = $3, stop_order = $4, updated_at = $5
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(stop.id)
        .bind(stop.route_id)
        .bind(&stop.stop_name)
        .bind(stop.stop_order)
        .bind(stop.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update stop"))?;
        row.map(Stop::from).ok_or(StoreError::NotFound)
    }

    async fn delete_stop(&self, id: Id) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM stops WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete stop"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleRepository for PostgresStore {
    async fn create_schedule(
        &self,
        schedule: NewSchedule,
        now: DateTime<Utc>,
    ) -> StoreResult<Schedule> {
        let row: ScheduleRow = sqlx::query_as(
            r"
            INSERT INTO schedules
                (route_id, bus_id, departure_time, arrival_time, price_cents, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            ",
        )
        .bind(schedule.route_id)
        .bind(schedule.bus_id)
        .bind(schedule.departure_time)
        .bind(schedule.arrival_time)
        .bind(schedule.price.map(|p| p.cents_i64()))
        .bind(schedule.status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create schedule"))?;
        row.try_into()
    }

    async fn get_schedule(&self, id: Id) -> StoreResult<Option<Schedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as("SELECT * FROM schedules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get schedule"))?;
        row.map(Schedule::try_from).transpose()
    }

    async fn list_schedules(&self) -> StoreResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> =
            sqlx::query_as("SELECT * FROM schedules ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error("list schedules"))?;
        convert_all(rows)
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<Schedule> {
        let row: Option<ScheduleRow> = sqlx::query_as(
            r"
            UPDATE schedules
            SET route_id = $2, bus_id = $3, departure_time = $4, arrival_time = $5,
                price_cents = $6, status = $7, updated_at = $8
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(schedule.id)
        .bind(schedule.route_id)
        .bind(schedule.bus_id)
        .bind(schedule.departure_time)
        .bind(schedule.arrival_time)
        .bind(schedule.price.map(|p| p.cents_i64()))
        .bind(schedule.status.as_str())
        .bind(schedule.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update schedule"))?;
        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn delete_schedule(&self, id: Id) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete schedule"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ============================================================================
// Trips, tickets, payments
// ============================================================================

#[async_trait]
impl TripRepository for PostgresStore {
    async fn create_trip(&self, trip: NewTrip, now: DateTime<Utc>) -> StoreResult<Trip> {
        let row: TripRow = sqlx::query_as(
            r"
            INSERT INTO trips
                (route_id, bus_id, created_by, trip_code, departure_time, available_seats,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            ",
        )
        .bind(trip.route_id)
        .bind(trip.bus_id)
        .bind(trip.created_by)
        .bind(&trip.trip_code)
        .bind(trip.departure_time)
        .bind(trip.available_seats)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create trip"))?;
        Ok(row.into())
    }

    async fn get_trip(&self, id: Id) -> StoreResult<Option<Trip>> {
        let row: Option<TripRow> = sqlx::query_as("SELECT * FROM trips WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get trip"))?;
        Ok(row.map(Trip::from))
    }

    async fn page_trips(&self, page: PageRequest) -> StoreResult<(Vec<Trip>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trips")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count trips"))?;
        let rows: Vec<TripRow> = sqlx::query_as(
            "SELECT * FROM trips ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(to_i64(page.limit()))
        .bind(to_i64(page.offset()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list trips"))?;
        Ok((rows.into_iter().map(Trip::from).collect(), to_u64(total)))
    }

    async fn trip_codes_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        sqlx::query_scalar("SELECT trip_code FROM trips WHERE left(trip_code, length($1)) = $1")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list trip codes"))
    }

    async fn bus_has_trip_between(
        &self,
        bus_id: Id,
        start: NaiveDateTime,
        end: NaiveDateTime,
        except: Option<Id>,
    ) -> StoreResult<bool> {
        sqlx::query_scalar(
            r"
            SELECT EXISTS(
                SELECT 1 FROM trips
                WHERE bus_id = $1
                  AND departure_time BETWEEN $2 AND $3
                  AND ($4::BIGINT IS NULL OR id <> $4)
            )
            ",
        )
        .bind(bus_id)
        .bind(start)
        .bind(end)
        .bind(except)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("check bus schedule"))
    }

    async fn update_trip(&self, trip: &Trip) -> StoreResult<Trip> {
        let row: Option<TripRow> = sqlx::query_as(
            r"
            UPDATE trips
            SET route_id = $2, bus_id = $3, trip_code = $4, departure_time = $5,
                available_seats = $6, updated_at = $7
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(trip.id)
        .bind(trip.route_id)
        .bind(trip.bus_id)
        .bind(&trip.trip_code)
        .bind(trip.departure_time)
        .bind(trip.available_seats)
        .bind(trip.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update trip"))?;
        row.map(Trip::from).ok_or(StoreError::NotFound)
    }

    async fn delete_trip(&self, id: Id) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete trip"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl TicketRepository for PostgresStore {
    async fn get_ticket(&self, id: Id) -> StoreResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get ticket"))?;
        row.map(Ticket::try_from).transpose()
    }

    async fn page_tickets(
        &self,
        user: Option<Id>,
        page: PageRequest,
    ) -> StoreResult<(Vec<Ticket>, u64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE ($1::BIGINT IS NULL OR user_id = $1)",
        )
        .bind(user)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("count tickets"))?;
        let rows: Vec<TicketRow> = sqlx::query_as(
            r"
            SELECT * FROM tickets
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user)
        .bind(to_i64(page.limit()))
        .bind(to_i64(page.offset()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list tickets"))?;
        Ok((convert_all(rows)?, to_u64(total)))
    }

    async fn ticket_code_exists(&self, ticket_code: &str) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tickets WHERE ticket_code = $1)")
            .bind(ticket_code)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("check ticket code"))
    }

    async fn taken_seats(&self, trip_id: Id) -> StoreResult<Vec<i32>> {
        sqlx::query_scalar("SELECT seat_number FROM tickets WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list taken seats"))
    }

    async fn issue_ticket(
        &self,
        ticket: NewTicket,
        payment_id: Id,
        now: DateTime<Utc>,
    ) -> StoreResult<(Ticket, Payment)> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;

        let linked: Option<(Option<i64>, String)> =
            sqlx::query_as("SELECT ticket_id, status FROM payments WHERE id = $1 FOR UPDATE")
                .bind(payment_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("lock payment"))?;
        match linked {
            None => return Err(StoreError::NotFound),
            Some((Some(existing), _)) => {
                return Err(StoreError::Conflict(format!(
                    "payment {payment_id} already linked to ticket {existing}"
                )));
            }
            Some((None, status)) if status != PaymentStatus::Completed.as_str() => {
                return Err(StoreError::Conflict(format!(
                    "payment {payment_id} is {status}, not completed"
                )));
            }
            Some((None, _)) => {}
        }

        let ticket_row: TicketRow = sqlx::query_as(
            r"
            INSERT INTO tickets
                (trip_id, user_id, ticket_code, seat_number, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            ",
        )
        .bind(ticket.trip_id)
        .bind(ticket.user_id)
        .bind(&ticket.ticket_code)
        .bind(ticket.seat_number)
        .bind(ticket.status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create ticket"))?;

        let payment_row: PaymentRow = sqlx::query_as(
            r"
            UPDATE payments SET ticket_id = $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(payment_id)
        .bind(ticket_row.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("link payment"))?;

        tx.commit().await.map_err(db_error("commit ticket"))?;

        Ok((ticket_row.try_into()?, payment_row.try_into()?))
    }

    async fn delete_ticket(&self, id: Id) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete ticket"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn create_payment(
        &self,
        payment: NewPayment,
        now: DateTime<Utc>,
    ) -> StoreResult<Payment> {
        let row: PaymentRow = sqlx::query_as(
            r"
            INSERT INTO payments
                (ticket_id, trip_id, user_id, amount_cents, method, status, transaction_id,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            ",
        )
        .bind(payment.ticket_id)
        .bind(payment.trip_id)
        .bind(payment.user_id)
        .bind(payment.amount.cents_i64())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create payment"))?;
        row.try_into()
    }

    async fn get_payment(&self, id: Id) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get payment"))?;
        row.map(Payment::try_from).transpose()
    }

    async fn list_payments(&self) -> StoreResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as("SELECT * FROM payments ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list payments"))?;
        convert_all(rows)
    }

    async fn payment_for_ticket(&self, ticket_id: Id) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as("SELECT * FROM payments WHERE ticket_id = $1 ORDER BY id LIMIT 1")
                .bind(ticket_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("get ticket payment"))?;
        row.map(Payment::try_from).transpose()
    }

    async fn update_payment_status(
        &self,
        id: Id,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Payment> {
        let row: Option<PaymentRow> = sqlx::query_as(
            "UPDATE payments SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update payment"))?;
        row.ok_or(StoreError::NotFound)?.try_into()
    }
}

#[async_trait]
impl StoreHealth for PostgresStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("ping database"))?;
        Ok(())
    }
}
