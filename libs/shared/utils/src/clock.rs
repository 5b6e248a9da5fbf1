use chrono::{DateTime, NaiveDate, Utc};

use crate::time::ClockTime;

/// Source of "now", injectable so the retiming engines are testable at
/// fixed instants.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now_utc().date_naive()
    }

    fn time_of_day(&self) -> ClockTime {
        ClockTime::from_naive(self.now_utc().time())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at(date: NaiveDate, time: ClockTime) -> Self {
        let naive = date
            .and_hms_opt(time.hour() as u32, time.minute() as u32, 0)
            .expect("clock time is always a valid time of day");
        Self(naive.and_utc())
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}
