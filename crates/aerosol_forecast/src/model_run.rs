//! Choosing which model run to download.
//!
//! CAMS runs its global forecast twice a day, at 00Z and 12Z. A run is not
//! queryable as soon as it starts: it has to finish and be archived first. Rather
//! than ask the archive what is available, we pick a run that is always at least
//! several hours old:
//!
//! - before 12:00 UTC, use the previous day's 12Z run;
//! - from 12:00 UTC onwards, use today's 00Z run.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use derive_more::Display;

/// The initialisation hour of a CAMS forecast run.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunHour {
    #[display("00:00")]
    T00,
    #[display("12:00")]
    T12,
}

impl RunHour {
    pub const fn hour(&self) -> u32 {
        match *self {
            Self::T00 => 0,
            Self::T12 => 12,
        }
    }
}

/// A single forecast initialisation instant.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("{date} {hour}")]
pub struct ModelRun {
    pub date: NaiveDate,
    pub hour: RunHour,
}

impl ModelRun {
    pub fn new(date: NaiveDate, hour: RunHour) -> Self {
        Self { date, hour }
    }

    /// The most recent run that is safely available at `now`.
    pub fn resolve(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        if now.hour() < 12 {
            // `pred_opt` only fails at `NaiveDate::MIN`, which no clock will ever report.
            let yesterday = today.pred_opt().unwrap_or(today);
            Self::new(yesterday, RunHour::T12)
        } else {
            Self::new(today, RunHour::T00)
        }
    }

    pub fn reference_datetime(&self) -> DateTime<Utc> {
        let midnight = self.date.and_time(NaiveTime::MIN);
        (midnight + TimeDelta::hours(i64::from(self.hour.hour()))).and_utc()
    }

    /// The valid time of a forecast `step` hours after this run.
    pub fn valid_time(&self, step: TimeDelta) -> DateTime<Utc> {
        self.reference_datetime() + step
    }

    /// The `date` field of a retrieval request, e.g. `2024-03-09`.
    pub fn forecast_date(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// The `time` field of a retrieval request, e.g. `12:00`.
    pub fn forecast_hour(&self) -> String {
        self.hour.to_string()
    }
}

/// Anything that can tell the current UTC time.
///
/// The acquisition cache reads the clock instead of calling `Utc::now` so that
/// sessions can be replayed at a fixed instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_morning_uses_previous_days_12z_run() {
        let run = ModelRun::resolve(utc(2024, 3, 10, 8, 0));
        assert_eq!(run, ModelRun::new(date(2024, 3, 9), RunHour::T12));
        assert_eq!(run.forecast_date(), "2024-03-09");
        assert_eq!(run.forecast_hour(), "12:00");
    }

    #[test]
    fn test_afternoon_uses_same_days_00z_run() {
        let run = ModelRun::resolve(utc(2024, 3, 10, 15, 0));
        assert_eq!(run, ModelRun::new(date(2024, 3, 10), RunHour::T00));
        assert_eq!(run.forecast_hour(), "00:00");
    }

    #[test]
    fn test_every_hour_of_the_day() {
        for hour in 0..24 {
            let run = ModelRun::resolve(utc(2024, 3, 10, hour, 59));
            if hour < 12 {
                assert_eq!(run, ModelRun::new(date(2024, 3, 9), RunHour::T12), "{hour}");
            } else {
                assert_eq!(run, ModelRun::new(date(2024, 3, 10), RunHour::T00), "{hour}");
            }
        }
    }

    #[test]
    fn test_boundaries() {
        // Exactly 12:00 already counts as the afternoon.
        assert_eq!(
            ModelRun::resolve(utc(2024, 3, 10, 12, 0)),
            ModelRun::new(date(2024, 3, 10), RunHour::T00)
        );
        assert_eq!(
            ModelRun::resolve(utc(2024, 3, 10, 11, 59)),
            ModelRun::new(date(2024, 3, 9), RunHour::T12)
        );
        // Midnight on the first of a month rolls back into the previous month (and year).
        assert_eq!(
            ModelRun::resolve(utc(2024, 1, 1, 0, 0)),
            ModelRun::new(date(2023, 12, 31), RunHour::T12)
        );
        assert_eq!(
            ModelRun::resolve(utc(2024, 3, 1, 3, 0)),
            ModelRun::new(date(2024, 2, 29), RunHour::T12)
        );
    }

    #[test]
    fn test_valid_time_and_display() {
        let run = ModelRun::new(date(2024, 3, 9), RunHour::T12);
        assert_eq!(run.reference_datetime(), utc(2024, 3, 9, 12, 0));
        assert_eq!(run.valid_time(TimeDelta::hours(15)), utc(2024, 3, 10, 3, 0));
        assert_eq!(run.to_string(), "2024-03-09 12:00");
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock(utc(2024, 3, 10, 8, 0));
        assert_eq!(clock.now(), utc(2024, 3, 10, 8, 0));
        assert_eq!((&clock).now(), utc(2024, 3, 10, 8, 0));
    }
}
