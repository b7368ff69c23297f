use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};

/// Source of "now" in the clinic's local time zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_local()
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(utc_offset_minutes: i32) -> Self {
        Self {
            offset: offset_from_minutes(utc_offset_minutes),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Clock pinned to a given instant; tests move it forward explicitly.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Local wall-clock `date` `time` at the given UTC offset.
    pub fn at(date: NaiveDate, time: NaiveTime, utc_offset_minutes: i32) -> Self {
        let offset = offset_from_minutes(utc_offset_minutes);
        let local = date.and_time(time);
        let now = offset
            .from_local_datetime(&local)
            .single()
            .unwrap_or_else(|| offset.from_utc_datetime(&local));
        Self::new(now)
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_reports_local_wall_time() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        let time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let clock = FixedClock::at(date, time, -180);

        assert_eq!(clock.today(), date);
        assert_eq!(clock.local_now().time(), time);
        assert_eq!(clock.now().with_timezone(&Utc).time(), NaiveTime::from_hms_opt(13, 0, 0).unwrap());

        clock.advance(Duration::hours(15));
        assert_eq!(clock.today(), date.succ_opt().unwrap());
    }
}
