//! Daily usage tracking for the advisory API and alert dispatch.
//!
//! Process-lifetime counters surfaced on the dashboard; rolls over when
//! the date changes.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Mutex;

/// Counters for a single day.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub date: Option<NaiveDate>,
    pub advisory_calls: u64,
    pub advisory_failures: u64,
    pub signals_generated: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub delivery_failures: u64,
}

/// Thread-safe daily usage tracker.
pub struct UsageTracker {
    state: Mutex<DailyUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DailyUsage::default()),
        }
    }

    fn with_day<F: FnOnce(&mut DailyUsage)>(&self, date: NaiveDate, f: F) {
        let mut usage = self.state.lock().expect("usage lock poisoned");
        if usage.date != Some(date) {
            *usage = DailyUsage {
                date: Some(date),
                ..DailyUsage::default()
            };
        }
        f(&mut usage);
    }

    pub fn record_advisory_call(&self, date: NaiveDate, success: bool) {
        self.with_day(date, |u| {
            u.advisory_calls += 1;
            if !success {
                u.advisory_failures += 1;
            }
        });
    }

    pub fn record_signal(&self, date: NaiveDate) {
        self.with_day(date, |u| u.signals_generated += 1);
    }

    pub fn record_alert_sent(&self, date: NaiveDate) {
        self.with_day(date, |u| u.alerts_sent += 1);
    }

    pub fn record_alert_suppressed(&self, date: NaiveDate) {
        self.with_day(date, |u| u.alerts_suppressed += 1);
    }

    pub fn record_delivery_failure(&self, date: NaiveDate) {
        self.with_day(date, |u| u.delivery_failures += 1);
    }

    /// Current counters.
    pub fn current(&self) -> DailyUsage {
        self.state.lock().expect("usage lock poisoned").clone()
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}
