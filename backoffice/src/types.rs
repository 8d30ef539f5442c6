//! Domain types for the back office.
//!
//! Entities mirror their table rows. Enumerations are stored as text and
//! parsed on the way out of the database; [`Money`] is held in cents.

use busdesk_auth::Role;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Row id (`BIGSERIAL`).
pub type Id = i64;

/// Wall-clock format for trip departures: `YYYY-MM-DD HH:MM:SS`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Text enumerations
// ============================================================================

/// A stored value did not match any variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// Enumeration name
    pub kind: &'static str,
    /// Offending value
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stored and serialized form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Account holder gender.
    Gender {
        /// Male
        Male => "male",
        /// Female
        Female => "female",
    }
}

text_enum! {
    /// Bus body type.
    BusType {
        /// Air-conditioned coach
        Ac => "AC",
        /// Coach without air conditioning
        NonAc => "Non-AC",
        /// Sleeper coach
        Sleeper => "Sleeper",
        /// Standard seater
        Seater => "Seater",
    }
}

text_enum! {
    /// Whether a bus can be put on the road.
    BusStatus {
        /// In service
        Active => "active",
        /// Off the road; cannot be scheduled on trips
        Maintenance => "maintenance",
    }
}

text_enum! {
    /// Timetable entry status.
    ScheduleStatus {
        /// Running
        Scheduled => "scheduled",
        /// Called off
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Ticket lifecycle.
    TicketStatus {
        /// Awaiting confirmation
        Pending => "pending",
        /// Seat held
        Confirmed => "confirmed",
        /// Voided
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Payment lifecycle.
    PaymentStatus {
        /// Not yet settled
        Pending => "pending",
        /// Settled; a ticket may be issued against it
        Completed => "completed",
        /// Declined or abandoned
        Failed => "failed",
    }
}

text_enum! {
    /// Payment channel.
    PaymentMethod {
        /// `EcoCash` mobile money
        Ecocash => "ecocash",
        /// ZB Bank
        Zb => "zb",
        /// CBZ Bank
        Cbz => "cbz",
        /// US dollars cash
        Usd => "usd",
        /// Zimbabwe Gold cash
        Zig => "zig",
    }
}

impl Default for BusStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl Default for ScheduleStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

// ============================================================================
// Money
// ============================================================================

/// A non-negative amount in cents.
///
/// Serializes as a JSON number in major units (`1250` cents is `12.5`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Converts a major-unit amount, rounding to the nearest cent.
    ///
    /// Returns `None` for negative, non-finite, or out-of-range input.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn from_major(amount: f64) -> Option<Self> {
        let cents = (amount * 100.0).round();
        if !cents.is_finite() || cents < 0.0 || cents > i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as u64))
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Cents as a signed database value.
    #[must_use]
    pub fn cents_i64(&self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Reads a signed database value. Negative values clamp to zero.
    #[must_use]
    pub fn from_db(cents: i64) -> Self {
        Self(u64::try_from(cents).unwrap_or(0))
    }

    /// Major units as a float, for display and JSON.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_major())
    }
}

// ============================================================================
// Date-times
// ============================================================================

/// Serde adapter for [`NaiveDateTime`] in [`DATETIME_FORMAT`].
pub mod wall_clock {
    use super::DATETIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::Serializer;

    /// Serialize as `YYYY-MM-DD HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(DATETIME_FORMAT))
    }

    /// Optional variant.
    pub mod option {
        use super::DATETIME_FORMAT;
        use chrono::NaiveDateTime;
        use serde::Serializer;

        /// Serialize `Some` as `YYYY-MM-DD HH:MM:SS`, `None` as null.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.collect_str(&v.format(DATETIME_FORMAT)),
                None => serializer.serialize_none(),
            }
        }
    }
}

/// Parse a trip departure in exactly `YYYY-MM-DD HH:MM:SS`.
///
/// Every field is zero-padded and the year has four digits.
#[must_use]
pub fn parse_wall_clock(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let padded = value.len() == "YYYY-MM-DD HH:MM:SS".len()
        && value
            .get(..4)
            .is_some_and(|year| year.bytes().all(|b| b.is_ascii_digit()));
    if !padded {
        return None;
    }
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).ok()
}

/// Parse a loosely formatted date-time.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, either without
/// seconds, RFC 3339 (converted to UTC), or a bare date (midnight).
#[must_use]
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ============================================================================
// Entities
// ============================================================================

/// Back-office account.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct User {
    /// Row id
    pub id: Id,
    /// Given name
    pub name: String,
    /// Family name
    pub surname: String,
    /// Unique email address
    pub email: String,
    /// Postal address
    pub address: Option<String>,
    /// Phone number
    pub phone: Option<String>,
    /// Gender, when recorded
    pub gender: Option<Gender>,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Unique login id (`ADM100`, `PSC101`, ...)
    pub staff_id: String,
    /// Account role
    pub role: Role,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// `name surname`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// Fields for a new account.
#[derive(Clone, Debug)]
pub struct NewUser {
    /// Given name
    pub name: String,
    /// Family name
    pub surname: String,
    /// Email address
    pub email: String,
    /// Postal address
    pub address: Option<String>,
    /// Phone number
    pub phone: Option<String>,
    /// Gender
    pub gender: Option<Gender>,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Generated staff id
    pub staff_id: String,
    /// Role
    pub role: Role,
}

/// A bus in the fleet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Bus {
    /// Row id
    pub id: Id,
    /// Unique fleet number
    pub bus_number: String,
    /// Body type
    #[serde(rename = "type")]
    pub bus_type: BusType,
    /// Seats
    pub capacity: i32,
    /// Service status
    pub status: BusStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new bus.
#[derive(Clone, Debug)]
pub struct NewBus {
    /// Unique fleet number
    pub bus_number: String,
    /// Body type
    pub bus_type: BusType,
    /// Seats
    pub capacity: i32,
    /// Service status
    pub status: BusStatus,
}

/// A route between two towns.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Route {
    /// Row id
    pub id: Id,
    /// Unique short code, used as the trip and ticket code prefix
    pub route_code: String,
    /// Departure town
    pub origin: String,
    /// Arrival town
    pub destination: String,
    /// Length in kilometres
    pub distance_km: f64,
    /// Free-form duration (`"4h 30m"`)
    pub estimated_time: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new route.
#[derive(Clone, Debug)]
pub struct NewRoute {
    /// Unique short code
    pub route_code: String,
    /// Departure town
    pub origin: String,
    /// Arrival town
    pub destination: String,
    /// Length in kilometres
    pub distance_km: f64,
    /// Free-form duration
    pub estimated_time: String,
}

/// An intermediate stop on a route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Stop {
    /// Row id
    pub id: Id,
    /// Owning route
    pub route_id: Id,
    /// Stop name
    pub stop_name: String,
    /// Position along the route, from 1
    pub stop_order: i32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new stop.
#[derive(Clone, Debug)]
pub struct NewStop {
    /// Owning route
    pub route_id: Id,
    /// Stop name
    pub stop_name: String,
    /// Position along the route
    pub stop_order: i32,
}

/// A timetable entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Row id
    pub id: Id,
    /// Route served
    pub route_id: Id,
    /// Bus assigned
    pub bus_id: Id,
    /// Departure
    #[serde(with = "wall_clock")]
    pub departure_time: NaiveDateTime,
    /// Arrival, after departure
    #[serde(with = "wall_clock")]
    pub arrival_time: NaiveDateTime,
    /// Fare
    pub price: Option<Money>,
    /// Status
    pub status: ScheduleStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new schedule.
#[derive(Clone, Debug)]
pub struct NewSchedule {
    /// Route served
    pub route_id: Id,
    /// Bus assigned
    pub bus_id: Id,
    /// Departure
    pub departure_time: NaiveDateTime,
    /// Arrival
    pub arrival_time: NaiveDateTime,
    /// Fare
    pub price: Option<Money>,
    /// Status
    pub status: ScheduleStatus,
}

/// A concrete departure of a bus on a route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Trip {
    /// Row id
    pub id: Id,
    /// Route driven
    pub route_id: Id,
    /// Bus used
    pub bus_id: Id,
    /// Admin who scheduled the trip
    pub created_by: Option<Id>,
    /// Unique code, `{route_code}-NNN`
    pub trip_code: String,
    /// Departure
    #[serde(with = "wall_clock")]
    pub departure_time: NaiveDateTime,
    /// Seats offered
    pub available_seats: i32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new trip.
#[derive(Clone, Debug)]
pub struct NewTrip {
    /// Route driven
    pub route_id: Id,
    /// Bus used
    pub bus_id: Id,
    /// Admin who scheduled the trip
    pub created_by: Option<Id>,
    /// Generated code
    pub trip_code: String,
    /// Departure
    pub departure_time: NaiveDateTime,
    /// Seats offered
    pub available_seats: i32,
}

/// A seat issued on a trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Ticket {
    /// Row id
    pub id: Id,
    /// Trip
    pub trip_id: Id,
    /// Passenger account the payment was attributed to
    pub user_id: Id,
    /// Unique code, `{route_code}-XXXXXXXX`
    pub ticket_code: String,
    /// Seat, `1..=capacity`
    pub seat_number: i32,
    /// Status
    pub status: TicketStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new ticket.
#[derive(Clone, Debug)]
pub struct NewTicket {
    /// Trip
    pub trip_id: Id,
    /// Owner
    pub user_id: Id,
    /// Generated code
    pub ticket_code: String,
    /// Assigned seat
    pub seat_number: i32,
    /// Status
    pub status: TicketStatus,
}

/// A recorded payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Payment {
    /// Row id
    pub id: Id,
    /// Ticket issued against this payment, if any
    pub ticket_id: Option<Id>,
    /// Trip paid for
    pub trip_id: Id,
    /// Account that recorded or made the payment
    pub user_id: Id,
    /// Amount
    pub amount: Money,
    /// Channel
    pub method: PaymentMethod,
    /// Status
    pub status: PaymentStatus,
    /// Gateway reference
    pub transaction_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new payment.
#[derive(Clone, Debug)]
pub struct NewPayment {
    /// Ticket, for online payments
    pub ticket_id: Option<Id>,
    /// Trip
    pub trip_id: Id,
    /// Paying or recording account
    pub user_id: Id,
    /// Amount
    pub amount: Money,
    /// Channel
    pub method: PaymentMethod,
    /// Status
    pub status: PaymentStatus,
    /// Gateway reference
    pub transaction_id: Option<String>,
}
