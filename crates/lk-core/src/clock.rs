use std::cell::Cell;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// A source of the current time.
///
/// Components that deal with cooldowns, timers, or timestamps take an
/// `Rc<dyn Clock>` so tests can drive time by hand.
pub trait Clock {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Move the clock forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.now.set(after_millis(self.now.get(), ms));
    }

    /// Jump to an arbitrary instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.now.set(instant);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// The last instant whose RFC 3339 form still has a four-digit year.
pub fn latest_instant() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|date| date.and_hms_milli_opt(23, 59, 59, 999))
        .map_or(DateTime::<Utc>::MAX_UTC, |naive| naive.and_utc())
}

/// `start + ms`, saturating at [`latest_instant`].
pub fn after_millis(start: DateTime<Utc>, ms: u64) -> DateTime<Utc> {
    let latest = latest_instant();
    i64::try_from(ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|delta| start.checked_add_signed(delta))
        .map_or(latest, |instant| instant.min(latest))
}

/// Whole milliseconds from `earlier` to `later`, zero if `later` is not after `earlier`.
pub fn millis_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    u64::try_from((later - earlier).num_milliseconds()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance_ms(1500);
        assert_eq!(millis_between(start, clock.now()), 1500);
    }

    #[test]
    fn after_millis_saturates_at_four_digit_years() {
        let start = DateTime::<Utc>::default();
        assert_eq!(after_millis(start, u64::MAX), latest_instant());
        assert_eq!(after_millis(start, 400_000_000_000_000), latest_instant());

        let json = serde_json::to_value(after_millis(start, u64::MAX)).unwrap();
        let text = json.as_str().unwrap();
        assert!(text.starts_with("9999-12-31T23:59:59"));
        assert!(DateTime::parse_from_rfc3339(text).is_ok());
    }

    #[test]
    fn millis_between_never_negative() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance_ms(10);
        assert_eq!(millis_between(clock.now(), start), 0);
    }
}
