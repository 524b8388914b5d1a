//! Signal engine orchestration.
//!
//! Drives one observation through the full pipeline: indicator store →
//! strategy evaluator (with an optional, budget-gated advisory call) →
//! alert gate → dispatch sinks. Also retains the latest snapshot and a
//! bounded ring of recent signals for the dashboard API.

use crate::config::Config;
use crate::error::EngineError;
use crate::services::alert_gate::{AlertGate, AlertRecord, GateDecision};
use crate::services::budget::DailyCallBudget;
use crate::services::evaluator::StrategyEvaluator;
use crate::services::indicator_store::IndicatorStore;
use crate::services::session::{millis_to_utc, SessionClock};
use crate::services::usage::{DailyUsage, UsageTracker};
use crate::sources::advisory::{AdvisoryClient, AdvisoryError};
use crate::sources::telegram::DispatchSink;
use crate::types::{AiOpinion, IndicatorSnapshot, Observation, Signal, SignalAction};
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const RECENT_SIGNALS_CAP: usize = 100;
const ADVISORY_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// What happened to one ingested observation.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Outside trading hours; nothing touched.
    MarketClosed,
    /// At or before the last accepted timestamp; dropped silently.
    StaleObservation,
    /// Accepted, but the window is still below the cold-start minimum.
    WarmingUp,
    /// Snapshot produced, no signal above the noise floor.
    NoSignal,
    /// Candidate signal suppressed by the alert gate.
    Suppressed(GateDecision),
    /// Signal delivered to every sink.
    Dispatched(Signal),
    /// Signal accepted by the gate but at least one sink failed; the
    /// gate still cooled to avoid re-storming the sink.
    DeliveryFailed(Signal),
}

/// The signal generation engine.
pub struct SignalEngine {
    store: IndicatorStore,
    evaluator: StrategyEvaluator,
    gate: AlertGate,
    clock: Arc<dyn SessionClock>,
    advisory: Option<Arc<dyn AdvisoryClient>>,
    sinks: Vec<Arc<dyn DispatchSink>>,
    ai_budget: DailyCallBudget,
    usage: Arc<UsageTracker>,
    advisory_timeout: Duration,
    fingerprint_strength_bucket: bool,
    /// Latest snapshot per instrument, for the dashboard.
    snapshots: DashMap<String, IndicatorSnapshot>,
    /// Most recent signals, newest first.
    recent: Mutex<VecDeque<Signal>>,
}

impl SignalEngine {
    pub fn new(
        config: &Config,
        clock: Arc<dyn SessionClock>,
        advisory: Option<Arc<dyn AdvisoryClient>>,
        sinks: Vec<Arc<dyn DispatchSink>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: IndicatorStore::new(config.window.clone(), clock.clone()),
            evaluator: StrategyEvaluator::new(config.strategy.clone()),
            gate: AlertGate::new(
                config.alerts.cooldown_secs,
                config.alerts.max_dispatch_per_min,
            ),
            clock,
            advisory,
            sinks,
            ai_budget: DailyCallBudget::new(config.alerts.ai_daily_budget),
            usage: Arc::new(UsageTracker::new()),
            advisory_timeout: Duration::from_secs(config.ai_timeout_secs),
            fingerprint_strength_bucket: config.alerts.fingerprint_strength_bucket,
            snapshots: DashMap::new(),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_SIGNALS_CAP)),
        })
    }

    /// Process one observation end to end.
    pub async fn ingest(&self, observation: Observation) -> IngestOutcome {
        let timestamp = observation.timestamp;
        let when = millis_to_utc(timestamp);
        if !self.clock.is_open(when) {
            return IngestOutcome::MarketClosed;
        }

        let symbol = observation.symbol.clone();
        if let Some(last_accepted) = self.store.last_timestamp(&symbol) {
            if timestamp <= last_accepted {
                let err = EngineError::StaleObservation {
                    symbol,
                    timestamp,
                    last_accepted,
                };
                trace!(error = %err, "observation dropped");
                return IngestOutcome::StaleObservation;
            }
        }

        let Some(snapshot) = self.store.update(observation) else {
            trace!(error = %EngineError::InsufficientData(symbol), "no snapshot yet");
            return IngestOutcome::WarmingUp;
        };
        self.snapshots.insert(symbol.clone(), snapshot.clone());

        let date = when.date_naive();

        // The rule-only result exists before any advisory attempt, so a
        // slow or failing advisory can never delay or mask it.
        let rule_signal = self.evaluator.evaluate(&snapshot, None);
        let rule_is_exit =
            matches!(rule_signal.as_ref().map(|s| s.action), Some(SignalAction::Exit));

        // Risk signals skip the advisory entirely; nothing it says
        // could change them.
        let signal = if rule_is_exit {
            rule_signal
        } else {
            match self.advisory_opinion(&snapshot, date).await {
                Ok(opinion) => self.evaluator.evaluate(&snapshot, Some(&opinion)),
                Err(err) => {
                    debug!(error = %err, "proceeding rule-only");
                    rule_signal
                }
            }
        };

        let Some(signal) = signal else {
            return IngestOutcome::NoSignal;
        };
        self.usage.record_signal(date);
        debug!(
            symbol = %signal.symbol,
            action = signal.action.label(),
            strength = signal.strength,
            "candidate signal"
        );

        match self
            .gate
            .offer(signal.fingerprint(self.fingerprint_strength_bucket), timestamp)
        {
            GateDecision::Dispatch => {
                self.remember(signal.clone());
                let mut any_failed = false;
                for sink in &self.sinks {
                    if let Err(e) = sink.deliver(&signal).await {
                        let err = EngineError::SinkDeliveryFailed(e.to_string());
                        warn!(symbol = %signal.symbol, error = %err, "delivery failed, not retrying");
                        any_failed = true;
                    }
                }
                if any_failed {
                    self.usage.record_delivery_failure(date);
                    IngestOutcome::DeliveryFailed(signal)
                } else {
                    self.usage.record_alert_sent(date);
                    info!(
                        symbol = %signal.symbol,
                        action = signal.action.label(),
                        "signal dispatched"
                    );
                    IngestOutcome::Dispatched(signal)
                }
            }
            decision => {
                self.usage.record_alert_suppressed(date);
                debug!(symbol = %signal.symbol, ?decision, "signal suppressed");
                IngestOutcome::Suppressed(decision)
            }
        }
    }

    /// One advisory request with a bounded timeout and a single retry.
    /// Budget exhaustion, quota errors and timeouts all degrade to
    /// "no opinion".
    async fn advisory_opinion(
        &self,
        snapshot: &IndicatorSnapshot,
        date: NaiveDate,
    ) -> Result<AiOpinion, EngineError> {
        let Some(client) = self.advisory.as_ref() else {
            return Err(EngineError::AdvisoryUnavailable("not configured".into()));
        };

        if !self.ai_budget.try_acquire(date) {
            return Err(EngineError::BudgetExhausted("advisory"));
        }

        let mut last_error = String::new();
        for attempt in 0..2 {
            match tokio::time::timeout(self.advisory_timeout, client.request_opinion(snapshot)).await
            {
                Ok(Ok(opinion)) => {
                    self.usage.record_advisory_call(date, true);
                    return Ok(opinion);
                }
                Ok(Err(AdvisoryError::QuotaExhausted)) => {
                    warn!(symbol = %snapshot.symbol, "advisory quota exhausted");
                    last_error = "quota exhausted".to_string();
                    break;
                }
                Ok(Err(e)) => {
                    warn!(symbol = %snapshot.symbol, attempt, error = %e, "advisory call failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(symbol = %snapshot.symbol, attempt, "advisory call timed out");
                    last_error = "timed out".to_string();
                }
            }
            if attempt == 0 {
                tokio::time::sleep(ADVISORY_RETRY_BACKOFF).await;
            }
        }

        self.usage.record_advisory_call(date, false);
        Err(EngineError::AdvisoryUnavailable(last_error))
    }

    fn remember(&self, signal: Signal) {
        let mut recent = self.recent.lock().expect("recent lock poisoned");
        if recent.len() == RECENT_SIGNALS_CAP {
            recent.pop_back();
        }
        recent.push_front(signal);
    }

    /// Latest snapshot for one instrument.
    pub fn latest_snapshot(&self, symbol: &str) -> Option<IndicatorSnapshot> {
        self.snapshots.get(symbol).map(|s| s.clone())
    }

    /// Latest snapshot for every instrument seen so far.
    pub fn all_snapshots(&self) -> Vec<IndicatorSnapshot> {
        self.snapshots.iter().map(|s| s.value().clone()).collect()
    }

    /// Recent dispatched signals, newest first, optionally filtered.
    pub fn recent_signals(&self, symbol: Option<&str>, limit: usize) -> Vec<Signal> {
        let recent = self.recent.lock().expect("recent lock poisoned");
        recent
            .iter()
            .filter(|s| symbol.map_or(true, |sym| s.symbol == sym))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Alert gate bookkeeping, for the dashboard.
    pub fn alert_records(&self) -> Vec<AlertRecord> {
        self.gate.records()
    }

    /// Daily usage counters.
    pub fn usage(&self) -> DailyUsage {
        self.usage.current()
    }

    /// Advisory calls left today.
    pub fn advisory_budget_remaining(&self, date: NaiveDate) -> u32 {
        self.ai_budget.remaining(date)
    }
}
