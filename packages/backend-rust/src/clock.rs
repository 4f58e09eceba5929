use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use parking_lot::Mutex;

/// Offset used when no zone is configured (Asia/Shanghai, no DST).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 8 * 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replay tooling.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut guard = self.now.lock();
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Calendar used for "today", study dates and hour-of-day buckets.
#[derive(Debug, Clone, Copy)]
pub struct StudyZone {
    offset: FixedOffset,
}

impl StudyZone {
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn hour_of(&self, instant: DateTime<Utc>) -> u32 {
        instant.with_timezone(&self.offset).hour()
    }

    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        let utc_naive = local_midnight - Duration::seconds(self.offset.local_minus_utc() as i64);
        DateTime::<Utc>::from_naive_utc_and_offset(utc_naive, Utc)
    }

    /// `[start_of_today, start_of_tomorrow)` for the day containing `now`.
    pub fn day_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = self.date_of(now);
        let start = self.start_of_day(today);
        (start, start + Duration::days(1))
    }
}

impl Default for StudyZone {
    fn default() -> Self {
        Self::from_offset_minutes(DEFAULT_UTC_OFFSET_MINUTES).unwrap_or_else(Self::utc)
    }
}
