//! Injectable time source

use crate::{Day, Timestamp};
use chrono::{Local, NaiveDateTime, Utc};
use std::sync::RwLock;

/// Source of "now" and "today".
///
/// Ledger dates, promotion windows, cache ages and the stale check all read
/// from a clock so tests can pin the calendar.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Local calendar day used for ledger rows.
    fn today(&self) -> Day;

    /// Local wall-clock time, used to schedule the daily sweep.
    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_utc()
    }
}

/// Wall clock. `today()` is the local calendar day.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn today(&self) -> Day {
        Local::now().date_naive()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock for tests. `today()` and `local_now()` read `now()` as UTC.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Clock fixed at midday UTC of the given day.
    pub fn at_day(day: Day) -> Self {
        let noon = day
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Self::new(noon)
    }

    pub fn set(&self, now: Timestamp) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.read().map(|g| *g).unwrap_or_else(|_| Utc::now())
    }

    fn today(&self) -> Day {
        self.now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let day = Day::from_ymd_opt(2025, 4, 30).unwrap();
        let clock = ManualClock::at_day(day);
        assert_eq!(clock.today(), day);

        clock.advance(chrono::Duration::hours(13));
        assert_eq!(clock.today(), day.succ_opt().unwrap());
        assert_eq!(clock.local_now(), clock.now().naive_utc());
    }

    #[test]
    fn test_system_clock_today_is_close_to_now() {
        let clock = SystemClock;
        let diff = (clock.today() - clock.now().date_naive()).num_days().abs();
        assert!(diff <= 1);
    }
}
