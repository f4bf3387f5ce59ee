// libs/appointment-cell/src/clock.rs
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use shared_config::AppConfig;

/// Conversion between stored UTC instants and the clinic's local wall clock.
#[derive(Debug, Clone, Copy)]
pub struct ClinicClock {
    offset: FixedOffset,
    today_override: Option<NaiveDate>,
}

impl ClinicClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset, today_override: None }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.clinic_offset())
    }

    /// Pin "today" so date generation is reproducible.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today_override = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today_override
            .unwrap_or_else(|| Utc::now().with_timezone(&self.offset).date_naive())
    }

    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        // A fixed offset maps every local time to exactly one instant
        (local - Duration::seconds(self.offset.local_minus_utc() as i64)).and_utc()
    }

    /// UTC bounds `[start, end)` of a clinic-local calendar day.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.to_utc(date.and_time(chrono::NaiveTime::MIN));
        (start, start + Duration::days(1))
    }
}
