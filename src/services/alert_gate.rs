//! Alert gate: per-fingerprint cooldown plus system-wide dispatch rate.
//!
//! Each (instrument, action) fingerprint moves Idle -> Cooling on a
//! dispatch and back to Idle once the cooldown elapses. The
//! check-and-set happens under the fingerprint's map entry, so two
//! near-simultaneous candidates can never both pass.

use crate::services::budget::DispatchRateLimiter;
use crate::types::Fingerprint;
use dashmap::DashMap;
use serde::Serialize;

/// What the gate decided for one candidate signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Accepted; the caller should deliver it now.
    Dispatch,
    /// Same fingerprint dispatched less than a cooldown ago.
    CoolingDown,
    /// The per-minute dispatch budget is spent; candidate dropped, not
    /// queued.
    RateLimited,
}

/// Dispatch bookkeeping for one fingerprint. `last_emitted_at` is
/// monotonically non-decreasing for the life of the process.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub fingerprint: Fingerprint,
    pub last_emitted_at: i64,
    pub emit_count: u64,
}

/// Stateful dedup filter in front of the dispatch sinks.
pub struct AlertGate {
    records: DashMap<Fingerprint, AlertRecord>,
    cooldown_ms: i64,
    rate: DispatchRateLimiter,
}

impl AlertGate {
    pub fn new(cooldown_secs: i64, max_dispatch_per_min: u32) -> Self {
        Self {
            records: DashMap::new(),
            cooldown_ms: cooldown_secs * 1000,
            rate: DispatchRateLimiter::new(max_dispatch_per_min),
        }
    }

    /// Offer a candidate. Exactly one of two same-fingerprint candidates
    /// inside a cooldown window can ever receive `Dispatch`.
    pub fn offer(&self, fingerprint: Fingerprint, now_ms: i64) -> GateDecision {
        let mut entry = self
            .records
            .entry(fingerprint.clone())
            .or_insert_with(|| AlertRecord {
                fingerprint,
                last_emitted_at: 0,
                emit_count: 0,
            });

        // Cooling: identical fingerprint + elapsed < cooldown => drop.
        if entry.emit_count > 0 && now_ms - entry.last_emitted_at < self.cooldown_ms {
            return GateDecision::CoolingDown;
        }

        // Cooldown passed; claim a rate slot before mutating the record
        // so a rate-limited candidate leaves the state machine untouched.
        if !self.rate.try_acquire(now_ms) {
            return GateDecision::RateLimited;
        }

        entry.last_emitted_at = entry.last_emitted_at.max(now_ms);
        entry.emit_count += 1;
        GateDecision::Dispatch
    }

    /// Snapshot of all records, for the dashboard.
    pub fn records(&self) -> Vec<AlertRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }
}
