//! Market session clock.
//!
//! Gates engine activity to exchange trading hours and provides the
//! session identifier the indicator store uses to reset its VWAP
//! accumulators.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

/// Clock abstraction so tests can pin the session open or closed.
pub trait SessionClock: Send + Sync {
    /// Whether the market is open at `now`.
    fn is_open(&self, now: DateTime<Utc>) -> bool;

    /// The trading date `now` belongs to, or `None` outside hours.
    /// A change of session date is the VWAP reset boundary.
    fn session_date(&self, now: DateTime<Utc>) -> Option<NaiveDate>;
}

/// NSE/BSE cash session: 09:15–15:30 IST, Monday through Friday.
/// IST has no daylight saving, so a fixed +05:30 offset is exact.
pub struct IstSessionClock {
    offset: FixedOffset,
    open: NaiveTime,
    close: NaiveTime,
}

impl IstSessionClock {
    pub fn new() -> Self {
        Self {
            offset: FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("valid IST offset"),
            open: NaiveTime::from_hms_opt(9, 15, 0).expect("valid open time"),
            close: NaiveTime::from_hms_opt(15, 30, 0).expect("valid close time"),
        }
    }

    fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    fn is_trading_day(weekday: Weekday) -> bool {
        !matches!(weekday, Weekday::Sat | Weekday::Sun)
    }
}

impl Default for IstSessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock for IstSessionClock {
    fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = self.local(now);
        let time = local.time();
        Self::is_trading_day(local.weekday()) && time >= self.open && time <= self.close
    }

    fn session_date(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
        self.is_open(now).then(|| self.local(now).date_naive())
    }
}

/// Convert an epoch-millisecond timestamp to UTC.
pub fn millis_to_utc(timestamp_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_else(Utc::now)
}
