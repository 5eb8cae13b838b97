use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};

use crate::models::DayKey;

/// Wall clock plus the local offset used to cut days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn offset_at(&self, at: DateTime<Utc>) -> FixedOffset;

    fn day_key(&self, at: DateTime<Utc>) -> DayKey {
        DayKey::from_timestamp(at, self.offset_at(at))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset_at(&self, at: DateTime<Utc>) -> FixedOffset {
        Local.offset_from_utc_datetime(&at.naive_utc()).fix()
    }
}

/// Clock that only moves when told to. Used by tests and by hosts replaying
/// recorded presence.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_offset(start, Utc.fix())
    }

    pub fn with_offset(start: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(start),
            offset,
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    pub fn advance_secs(&self, secs: i64) -> DateTime<Utc> {
        let mut guard = self.lock();
        *guard += chrono::Duration::seconds(secs);
        *guard
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }

    fn offset_at(&self, _at: DateTime<Utc>) -> FixedOffset {
        self.offset
    }
}
