//! Seat availability and trip scheduling rules.

use crate::types::{Bus, BusStatus};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;

/// Half-width of the window around a departure in which the same bus may
/// not depart again.
pub const CONFLICT_WINDOW_HOURS: i64 = 3;

/// Inclusive window `[departure - 3h, departure + 3h]`, clamped to the
/// representable range.
#[must_use]
pub fn conflict_window(departure: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let width = Duration::hours(CONFLICT_WINDOW_HOURS);
    (
        departure.checked_sub_signed(width).unwrap_or(NaiveDateTime::MIN),
        departure.checked_add_signed(width).unwrap_or(NaiveDateTime::MAX),
    )
}

/// Whether two departures of the same bus clash.
#[must_use]
pub fn departures_conflict(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    let (start, end) = conflict_window(a);
    start <= b && b <= end
}

/// Whether a bus may be put on a trip.
#[must_use]
pub fn is_schedulable(bus: &Bus) -> bool {
    bus.status != BusStatus::Maintenance
}

/// Seats left on a trip: capacity minus tickets issued, floored at zero.
#[must_use]
pub fn seats_remaining(capacity: i32, tickets_issued: usize) -> i64 {
    (i64::from(capacity) - i64::try_from(tickets_issued).unwrap_or(i64::MAX)).max(0)
}

/// Lowest seat in `1..=capacity` not in `taken`.
#[must_use]
pub fn lowest_free_seat(capacity: i32, taken: &[i32]) -> Option<i32> {
    let taken: HashSet<i32> = taken.iter().copied().collect();
    (1..=capacity).find(|seat| !taken.contains(seat))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{BusType, parse_wall_clock};
    use chrono::Utc;

    fn at(s: &str) -> NaiveDateTime {
        parse_wall_clock(s).unwrap()
    }

    #[test]
    fn test_window_is_inclusive() {
        let departure = at("2025-09-01 12:00:00");
        assert!(departures_conflict(departure, at("2025-09-01 09:00:00")));
        assert!(departures_conflict(departure, at("2025-09-01 15:00:00")));
        assert!(!departures_conflict(departure, at("2025-09-01 08:59:59")));
        assert!(!departures_conflict(departure, at("2025-09-01 15:00:01")));
    }

    #[test]
    fn test_window_crosses_midnight() {
        let (start, end) = conflict_window(at("2025-09-01 23:30:00"));
        assert_eq!(start, at("2025-09-01 20:30:00"));
        assert_eq!(end, at("2025-09-02 02:30:00"));
    }

    #[test]
    fn test_window_clamps_at_calendar_ends() {
        let last = NaiveDateTime::MAX - Duration::hours(1);
        let (start, end) = conflict_window(last);
        assert_eq!(start, last - Duration::hours(3));
        assert_eq!(end, NaiveDateTime::MAX);
        assert!(departures_conflict(last, NaiveDateTime::MAX));

        let first = NaiveDateTime::MIN + Duration::hours(1);
        let (start, end) = conflict_window(first);
        assert_eq!(start, NaiveDateTime::MIN);
        assert_eq!(end, first + Duration::hours(3));
    }

    #[test]
    fn test_maintenance_buses_are_not_schedulable() {
        let now = Utc::now();
        let mut bus = Bus {
            id: 1,
            bus_number: "BUS-001".into(),
            bus_type: BusType::Seater,
            capacity: 60,
            status: BusStatus::Active,
            created_at: now,
            updated_at: now,
        };
        assert!(is_schedulable(&bus));
        bus.status = BusStatus::Maintenance;
        assert!(!is_schedulable(&bus));
    }

    #[test]
    fn test_seats_remaining_floors_at_zero() {
        assert_eq!(seats_remaining(40, 39), 1);
        assert_eq!(seats_remaining(40, 40), 0);
        assert_eq!(seats_remaining(40, 45), 0);
    }

    #[test]
    fn test_lowest_free_seat_fills_gaps() {
        assert_eq!(lowest_free_seat(4, &[]), Some(1));
        assert_eq!(lowest_free_seat(4, &[1, 2, 4]), Some(3));
        assert_eq!(lowest_free_seat(4, &[4, 3, 2, 1]), None);
        assert_eq!(lowest_free_seat(0, &[]), None);
    }
}
