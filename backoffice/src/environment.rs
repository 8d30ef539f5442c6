//! Injected time source.
//!
//! Production uses [`SystemClock`]; tests use [`FixedClock`] so that
//! "departure must be after now" and token expiry are deterministic.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

/// Clock trait: abstracts time operations for testability.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that stays put until moved.
///
/// Clones share the same instant, so a test can keep a handle and advance
/// the time seen by the server.
///
/// ```
/// use busdesk_backoffice::environment::{Clock, FixedClock};
/// use chrono::{Duration, Utc};
///
/// let start = Utc::now();
/// let clock = FixedClock::new(start);
/// assert_eq!(clock.now(), clock.now());
///
/// clock.advance(Duration::hours(1));
/// assert_eq!(clock.now(), start + Duration::hours(1));
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(RwLock::new(time)),
        }
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        if let Ok(mut guard) = self.time.write() {
            *guard = time;
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.time.write() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.time.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
