//! Shared call budgets.
//!
//! The engine has exactly two pieces of cross-instrument mutable state:
//! the advisory daily call budget and the dispatch-per-minute window.
//! Both are explicit counter services with check-and-increment performed
//! under one lock, injected where needed rather than read ambiently.

use chrono::NaiveDate;
use std::sync::Mutex;

/// A per-day call allowance. Once spent, callers skip the guarded
/// operation for the rest of that date; the counter rolls over when the
/// date changes.
pub struct DailyCallBudget {
    limit: u32,
    state: Mutex<DayCount>,
}

struct DayCount {
    date: Option<NaiveDate>,
    used: u32,
}

impl DailyCallBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            state: Mutex::new(DayCount { date: None, used: 0 }),
        }
    }

    /// Atomically claim one call for `date`. Returns false when the
    /// budget for that date is exhausted.
    pub fn try_acquire(&self, date: NaiveDate) -> bool {
        let mut state = self.state.lock().expect("budget lock poisoned");
        if state.date != Some(date) {
            state.date = Some(date);
            state.used = 0;
        }
        if state.used >= self.limit {
            return false;
        }
        state.used += 1;
        true
    }

    /// Calls left for `date`.
    pub fn remaining(&self, date: NaiveDate) -> u32 {
        let state = self.state.lock().expect("budget lock poisoned");
        if state.date == Some(date) {
            self.limit.saturating_sub(state.used)
        } else {
            self.limit
        }
    }
}

/// Fixed one-minute dispatch window. Excess candidates are dropped by
/// the caller, never queued.
pub struct DispatchRateLimiter {
    max_per_min: u32,
    state: Mutex<WindowCount>,
}

struct WindowCount {
    minute: i64,
    used: u32,
}

impl DispatchRateLimiter {
    pub fn new(max_per_min: u32) -> Self {
        Self {
            max_per_min,
            state: Mutex::new(WindowCount { minute: i64::MIN, used: 0 }),
        }
    }

    /// Atomically claim one dispatch slot in the minute containing
    /// `now_ms`.
    pub fn try_acquire(&self, now_ms: i64) -> bool {
        let minute = now_ms.div_euclid(60_000);
        let mut state = self.state.lock().expect("rate lock poisoned");
        if state.minute != minute {
            state.minute = minute;
            state.used = 0;
        }
        if state.used >= self.max_per_min {
            return false;
        }
        state.used += 1;
        true
    }
}
