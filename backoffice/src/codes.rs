//! Sequential-code generators.
//!
//! Every generator takes the codes already in use and derives the next one
//! by scanning their numeric suffixes. Suffixes are compared as numbers, so
//! `PSC1000` sorts after `PSC999`. Codes whose suffix is not a number are
//! skipped.

use busdesk_auth::Role;
use rand::Rng;

/// Prefix for generated bus numbers.
pub const BUS_NUMBER_PREFIX: &str = "BUS";

/// Route code used for tickets on trips whose route is gone.
pub const GENERIC_ROUTE_CODE: &str = "GENERIC";

/// Length of the random part of a ticket code.
pub const TICKET_SUFFIX_LEN: usize = 8;

const TICKET_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Staff id prefix for a role.
#[must_use]
pub const fn staff_id_prefix(role: Role) -> &'static str {
    match role {
        Role::Admin => "ADM",
        Role::Staff => "PSC",
        Role::Operator => "OPR",
    }
}

/// First number handed out for a role.
#[must_use]
pub const fn staff_id_start(role: Role) -> u64 {
    match role {
        Role::Admin | Role::Staff => 100,
        Role::Operator => 200,
    }
}

/// One past the highest numeric suffix among `codes` that start with `prefix`.
///
/// A suffix at `u64::MAX` has no successor and is skipped.
fn next_suffix<'a>(prefix: &str, codes: impl IntoIterator<Item = &'a str>) -> Option<u64> {
    codes
        .into_iter()
        .filter_map(|code| code.strip_prefix(prefix))
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse::<u64>().ok()?.checked_add(1))
        .max()
}

/// Next staff id for `role`, given the ids already issued.
///
/// ```
/// use busdesk_auth::Role;
/// use busdesk_backoffice::codes::next_staff_id;
///
/// assert_eq!(next_staff_id(Role::Staff, ["PSC100", "PSC104"]), "PSC105");
/// assert_eq!(next_staff_id(Role::Operator, Vec::<&str>::new()), "OPR200");
/// ```
#[must_use]
pub fn next_staff_id<'a>(role: Role, existing: impl IntoIterator<Item = &'a str>) -> String {
    let prefix = staff_id_prefix(role);
    let start = staff_id_start(role);
    let next = next_suffix(prefix, existing).map_or(start, |n| n.max(start));
    format!("{prefix}{next:03}")
}

/// Next trip code on a route: `{route_code}-NNN`, counting from 1.
#[must_use]
pub fn next_trip_code<'a>(route_code: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let prefix = format!("{route_code}-");
    let next = next_suffix(&prefix, existing).unwrap_or(1);
    format!("{prefix}{next:03}")
}

/// Next fleet number: `BUS-NNN`, counting from 1.
#[must_use]
pub fn next_bus_number<'a>(existing: impl IntoIterator<Item = &'a str>) -> String {
    next_trip_code(BUS_NUMBER_PREFIX, existing)
}

/// Random ticket code: `{route_code}-XXXXXXXX` with uppercase letters and digits.
///
/// Callers regenerate on collision.
pub fn ticket_code<R: Rng + ?Sized>(route_code: Option<&str>, rng: &mut R) -> String {
    let suffix: String = (0..TICKET_SUFFIX_LEN)
        .map(|_| char::from(TICKET_ALPHABET[rng.gen_range(0..TICKET_ALPHABET.len())]))
        .collect();
    format!("{}-{suffix}", route_code.unwrap_or(GENERIC_ROUTE_CODE))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_first_staff_ids_per_role() {
        let none: Vec<&str> = Vec::new();
        assert_eq!(next_staff_id(Role::Admin, none.clone()), "ADM100");
        assert_eq!(next_staff_id(Role::Staff, none.clone()), "PSC100");
        assert_eq!(next_staff_id(Role::Operator, none), "OPR200");
    }

    #[test]
    fn test_staff_id_uses_numeric_maximum() {
        let ids = ["PSC099", "PSC999", "PSC1000", "PSC100"];
        assert_eq!(next_staff_id(Role::Staff, ids), "PSC1001");
    }

    #[test]
    fn test_staff_id_never_below_start() {
        assert_eq!(next_staff_id(Role::Operator, ["OPR005"]), "OPR200");
        assert_eq!(next_staff_id(Role::Admin, ["ADM099"]), "ADM100");
    }

    #[test]
    fn test_staff_id_ignores_other_prefixes_and_garbage() {
        let ids = ["ADM500", "PSCX12", "PSC", "PSC-3", "PSC103"];
        assert_eq!(next_staff_id(Role::Staff, ids), "PSC104");
    }

    #[test]
    fn test_trip_codes_count_per_route() {
        let codes = ["HRE-BYO-001", "HRE-BYO-002", "HRE-MUT-009"];
        assert_eq!(next_trip_code("HRE-BYO", codes), "HRE-BYO-003");
        assert_eq!(next_trip_code("HRE-MUT", codes), "HRE-MUT-010");
        assert_eq!(next_trip_code("HRE-GWE", codes), "HRE-GWE-001");
    }

    #[test]
    fn test_trip_code_prefix_must_match_exactly() {
        // "HRE-BYO-EXP-004" belongs to route HRE-BYO-EXP, not HRE-BYO.
        let codes = ["HRE-BYO-EXP-004", "HRE-BYO-001"];
        assert_eq!(next_trip_code("HRE-BYO", codes), "HRE-BYO-002");
    }

    #[test]
    fn test_bus_numbers() {
        assert_eq!(next_bus_number(Vec::<&str>::new()), "BUS-001");
        assert_eq!(next_bus_number(["BUS-007", "ZW-1234", "BUS-010"]), "BUS-011");
    }

    #[test]
    fn test_suffix_without_successor_is_skipped() {
        let max = format!("BUS-{}", u64::MAX);
        assert_eq!(next_bus_number([max.as_str()]), "BUS-001");
        assert_eq!(next_bus_number([max.as_str(), "BUS-041"]), "BUS-042");

        let staff = format!("PSC{}", u64::MAX);
        assert_eq!(next_staff_id(Role::Staff, [staff.as_str(), "PSC120"]), "PSC121");
        // Too long for u64 at all
        assert_eq!(next_trip_code("HRE-BYO", ["HRE-BYO-99999999999999999999"]), "HRE-BYO-001");
    }

    #[test]
    fn test_ticket_code_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = ticket_code(Some("HRE-BYO"), &mut rng);
        let suffix = code.strip_prefix("HRE-BYO-").unwrap();
        assert_eq!(suffix.len(), TICKET_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));

        assert!(ticket_code(None, &mut rng).starts_with("GENERIC-"));
    }
}
