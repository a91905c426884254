use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Persisted format of claim timestamps (`YYYY.MM.DD HH:MM:SS`, UTC).
pub const CLAIM_TIME_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// A source of the current UTC instant.
///
/// This abstraction allows you to plug in the system clock in production and
/// a pinned or manually advanced clock in tests.
///
/// # Example
///
/// ```
/// use allotter::{FixedClock, TimeSource};
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
/// let clock = FixedClock::new(at);
/// assert_eq!(clock.now(), at);
/// ```
pub trait TimeSource: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by [`Utc::now`].
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Clone, Debug)]
pub struct FixedClock {
    at: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at: Arc::new(Mutex::new(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.lock() = at;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut at = self.at.lock();
        *at += by;
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock()
    }
}

/// Formats a claim timestamp the way pool files store it.
pub fn format_claim_time(at: DateTime<Utc>) -> String {
    at.format(CLAIM_TIME_FORMAT).to_string()
}

/// Parses a stored claim timestamp. Returns `None` for empty or hand-mangled
/// text.
pub fn parse_claim_time(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), CLAIM_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn claim_time_text_round_trips_at_second_precision() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 7, 5, 1).unwrap();
        let text = format_claim_time(at);
        assert_eq!(text, "2025.03.09 07:05:01");
        assert_eq!(parse_claim_time(&text), Some(at));
    }

    #[test]
    fn mangled_claim_time_is_ignored() {
        assert_eq!(parse_claim_time(""), None);
        assert_eq!(parse_claim_time("2025-03-09 07:05:01"), None);
        assert_eq!(parse_claim_time("yesterday"), None);
    }

    #[test]
    fn fixed_clock_clones_share_state() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        let other = clock.clone();
        clock.advance(TimeDelta::days(2));
        assert_eq!(other.now(), start + TimeDelta::days(2));
    }
}
