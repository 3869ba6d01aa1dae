//! Wall-clock access and local-day arithmetic.
//!
//! Quotas and "due today" checks work on the user's local calendar day, so
//! every time-dependent operation takes a [`Clock`] rather than reading the
//! system time directly.

use std::sync::RwLock;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveTime, Offset, TimeZone,
    Utc,
};

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Source of the current instant and of the local calendar.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local calendar day containing `at`.
    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate;

    /// Instant of local midnight starting `date`.
    fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    /// Local day of `at`, counted from 1970-01-01.
    fn day_index(&self, at: DateTime<Utc>) -> i64 {
        days_since_epoch(self.local_date(at))
    }
}

pub fn days_since_epoch(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE
}

/// Clock backed by the system time and time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&Local).date_naive()
    }

    fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::default());
        match Local.from_local_datetime(&midnight).earliest() {
            Some(local) => local.with_timezone(&Utc),
            // Midnight skipped by a DST transition.
            None => Utc.from_utc_datetime(&midnight),
        }
    }
}

/// Settable clock with a fixed UTC offset, for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: RwLock::new(now),
            offset,
        }
    }

    pub fn utc(now: DateTime<Utc>) -> Self {
        Self::new(now, Utc.fix())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.set(self.now() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::default());
        match self.offset.from_local_datetime(&midnight).single() {
            Some(local) => local.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&midnight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_days_since_epoch() {
        assert_eq!(days_since_epoch(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()), 0);
        assert_eq!(days_since_epoch(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
        assert_eq!(days_since_epoch(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()), -1);
    }

    #[test]
    fn test_fixed_clock_uses_offset_for_local_day() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let clock = FixedClock::new(at("2024-03-10T20:00:00Z"), tokyo);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());

        let utc = FixedClock::utc(at("2024-03-10T20:00:00Z"));
        assert_eq!(utc.today(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn test_start_of_day_respects_offset() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let clock = FixedClock::new(at("2024-03-10T20:00:00Z"), tokyo);
        let midnight = clock.start_of_day(clock.today());
        assert_eq!(midnight, at("2024-03-10T15:00:00Z"));
    }

    #[test]
    fn test_advance_crosses_day_boundary() {
        let clock = FixedClock::utc(at("2024-03-10T23:30:00Z"));
        let before = clock.day_index(clock.now());
        clock.advance(Duration::hours(1));
        assert_eq!(clock.day_index(clock.now()), before + 1);
    }
}
