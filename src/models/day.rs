use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Local calendar date that partitions session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_timestamp(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self(at.with_timezone(&offset).date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Local midnight that opens this day, expressed in UTC.
    pub fn start_utc(&self, offset: FixedOffset) -> DateTime<Utc> {
        let local_midnight = self.0.and_time(NaiveTime::MIN);
        let utc_naive =
            local_midnight - chrono::Duration::seconds(i64::from(offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc_naive)
    }

    /// Local midnight that closes this day, expressed in UTC.
    pub fn end_utc(&self, offset: FixedOffset) -> DateTime<Utc> {
        match self.0.succ_opt() {
            Some(next) => DayKey(next).start_utc(offset),
            None => self.start_utc(offset) + chrono::Duration::days(1),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>, offset: FixedOffset) -> bool {
        Self::from_timestamp(at, offset) == *self
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}
