use time::util::days_in_year_month;
use time::{Duration, OffsetDateTime};

/// Half-open time range `[start, end)`. All windows produced here sit on UTC
/// calendar boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Window {
    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// The UTC calendar day containing `now`.
pub fn utc_day_window(now: OffsetDateTime) -> Window {
    let start = now.date().midnight().assume_utc();
    Window {
        start,
        end: start + Duration::days(1),
    }
}

/// The UTC calendar week containing `now`. Weeks start Monday.
pub fn utc_week_window(now: OffsetDateTime) -> Window {
    let back = i64::from(now.date().weekday().number_days_from_monday());
    let start = (now.date() - Duration::days(back)).midnight().assume_utc();
    Window {
        start,
        end: start + Duration::days(7),
    }
}

/// The UTC calendar month containing `now`.
pub fn utc_month_window(now: OffsetDateTime) -> Window {
    let date = now.date();
    let start = date.replace_day(1).unwrap_or(date).midnight().assume_utc();
    let len = i64::from(days_in_year_month(date.year(), date.month()));
    Window {
        start,
        end: start + Duration::days(len),
    }
}

/// Time source for the engine. Injected so tests can pin `now`.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
