/**
 * Signal Engine End-to-End Tests
 *
 * Drives the full pipeline through its public API with stub
 * collaborators:
 * - synthetic uptrend producing exactly one buy then cooldown
 * - session gating (out-of-hours feeds touch nothing)
 * - advisory degradation (failing AI never changes the rule path)
 * - PCR edge cases with an empty call side
 */

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use banshee::config::Config;
use banshee::services::{GateDecision, IngestOutcome, IstSessionClock, SessionClock, SignalEngine};
use banshee::sources::{AdvisoryClient, AdvisoryError, DispatchSink, SinkError};
use banshee::types::{
    AiOpinion, ChainSnapshot, IndicatorSnapshot, Observation, Signal, SignalAction, StrikeEntry,
};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

/// Session clock that treats every timestamp as in-session.
struct AlwaysOpen;

impl SessionClock for AlwaysOpen {
    fn is_open(&self, _now: DateTime<Utc>) -> bool {
        true
    }
    fn session_date(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
        Some(now.date_naive())
    }
}

/// Advisory stub that always fails.
struct BrokenAdvisor;

#[async_trait]
impl AdvisoryClient for BrokenAdvisor {
    async fn request_opinion(
        &self,
        _snapshot: &IndicatorSnapshot,
    ) -> Result<AiOpinion, AdvisoryError> {
        Err(AdvisoryError::Timeout)
    }
}

/// Sink that records everything it is asked to deliver.
#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<Signal>>,
}

#[async_trait]
impl DispatchSink for RecordingSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), SinkError> {
        self.delivered.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

const T0: i64 = 1_786_500_000_000;

fn test_config() -> Config {
    let mut config = Config::default();
    config.window.min_bars = 5;
    config.window.level_lookback = 2;
    // Long enough to cover the whole synthetic feed.
    config.alerts.cooldown_secs = 1800;
    config
}

fn engine(
    config: Config,
    advisory: Option<Arc<dyn AdvisoryClient>>,
    sink: Arc<RecordingSink>,
) -> Arc<SignalEngine> {
    SignalEngine::new(&config, Arc::new(AlwaysOpen), advisory, vec![sink])
}

fn bar(i: i64, price: f64) -> Observation {
    Observation::sample("NIFTY", T0 + i * 60_000, price, 1_000.0)
}

/// 30-bar uptrend: steady rally, a pullback that prints a swing high and
/// a swing low, then a breakout through the swing high.
fn uptrend_30() -> Vec<f64> {
    let mut path = Vec::new();
    for i in 0..=12 {
        path.push(22_800.0 + i as f64 * 20.0);
    }
    path.extend([23_020.0, 22_990.0, 22_960.0, 22_940.0]);
    path.extend([22_980.0, 23_010.0, 23_050.0, 23_080.0, 23_120.0, 23_160.0]);
    for i in 0..7 {
        path.push(23_180.0 + i as f64 * 25.0);
    }
    assert_eq!(path.len(), 30);
    path
}

fn chain(call_oi: u64, put_oi: u64) -> ChainSnapshot {
    ChainSnapshot {
        expiry: "2026-08-13".into(),
        strikes: vec![StrikeEntry {
            strike: 23_000,
            call_oi,
            put_oi,
            call_volume: 0,
            put_volume: 0,
            call_ltp: 0.0,
            put_ltp: 0.0,
            call_iv: None,
            put_iv: None,
        }],
    }
}

#[tokio::test]
async fn test_uptrend_breakout_emits_exactly_one_buy() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(test_config(), None, sink.clone());

    // PCR 0.8: below the bearish threshold, not yet bullish.
    for (i, price) in uptrend_30().iter().enumerate() {
        engine
            .ingest(bar(i as i64, *price).with_chain(chain(10_000, 8_000)))
            .await;
    }

    let delivered = sink.delivered.lock().unwrap().clone();
    let buys: Vec<&Signal> = delivered
        .iter()
        .filter(|s| s.action == SignalAction::Buy)
        .collect();
    assert_eq!(buys.len(), 1, "delivered: {:?}", delivered);
    assert!(buys[0].strength > 0.45);
    assert!(buys[0]
        .reasons
        .iter()
        .any(|r| r.contains("Breakout above resistance")));

    // The signal references the snapshot that produced it.
    assert_eq!(buys[0].snapshot.symbol, "NIFTY");
    assert_eq!(buys[0].created_at, buys[0].snapshot.as_of);
}

#[tokio::test]
async fn test_qualifying_bars_inside_cooldown_are_suppressed() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(test_config(), None, sink.clone());

    for (i, price) in uptrend_30().iter().enumerate() {
        engine.ingest(bar(i as i64, *price)).await;
    }
    let delivered_before = sink.delivered.lock().unwrap().len();
    assert!(delivered_before >= 1);

    // Five more qualifying breakout bars, all inside the 600s cooldown
    // of the last dispatch.
    for i in 0..5 {
        let outcome = engine.ingest(bar(30 + i, 23_400.0 + i as f64 * 30.0)).await;
        assert!(
            matches!(
                outcome,
                IngestOutcome::Suppressed(GateDecision::CoolingDown)
            ),
            "bar {}: {:?}",
            i,
            outcome
        );
    }
    assert_eq!(sink.delivered.lock().unwrap().len(), delivered_before);
}

#[tokio::test]
async fn test_cooldown_expiry_allows_redispatch() {
    let mut config = test_config();
    config.alerts.cooldown_secs = 120; // two bars
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(config, None, sink.clone());

    for (i, price) in uptrend_30().iter().enumerate() {
        engine.ingest(bar(i as i64, *price)).await;
    }

    // The rally kept qualifying after the first dispatch, so with a
    // two-bar cooldown more than one buy made it through.
    let buys = sink
        .delivered
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.action == SignalAction::Buy)
        .count();
    assert!(buys > 1);
}

#[tokio::test]
async fn test_out_of_hours_feed_is_inert() {
    let mut config = test_config();
    config.window.min_bars = 1;
    let sink = Arc::new(RecordingSink::default());
    // Real IST clock; all bars stamped 03:00-03:30 IST on a weekday.
    let engine = SignalEngine::new(
        &config,
        Arc::new(IstSessionClock::new()),
        None,
        vec![sink.clone()],
    );

    let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
    let closed_base = offset
        .with_ymd_and_hms(2026, 8, 7, 3, 0, 0)
        .unwrap()
        .timestamp_millis();

    for (i, price) in uptrend_30().iter().enumerate() {
        let observation =
            Observation::sample("NIFTY", closed_base + i as i64 * 60_000, *price, 1_000.0);
        let outcome = engine.ingest(observation).await;
        assert!(matches!(outcome, IngestOutcome::MarketClosed));
    }

    assert!(engine.all_snapshots().is_empty());
    assert!(sink.delivered.lock().unwrap().is_empty());
    assert_eq!(engine.usage().signals_generated, 0);
}

#[tokio::test(start_paused = true)]
async fn test_broken_advisory_matches_rule_only_dispatches() {
    let rule_sink = Arc::new(RecordingSink::default());
    let rule_engine = engine(test_config(), None, rule_sink.clone());

    let degraded_sink = Arc::new(RecordingSink::default());
    let degraded_engine = engine(
        test_config(),
        Some(Arc::new(BrokenAdvisor)),
        degraded_sink.clone(),
    );

    for (i, price) in uptrend_30().iter().enumerate() {
        rule_engine.ingest(bar(i as i64, *price)).await;
        degraded_engine.ingest(bar(i as i64, *price)).await;
    }

    let rule_fingerprints: Vec<(String, SignalAction)> = rule_sink
        .delivered
        .lock()
        .unwrap()
        .iter()
        .map(|s| (s.symbol.clone(), s.action))
        .collect();
    let degraded_fingerprints: Vec<(String, SignalAction)> = degraded_sink
        .delivered
        .lock()
        .unwrap()
        .iter()
        .map(|s| (s.symbol.clone(), s.action))
        .collect();

    assert_eq!(rule_fingerprints, degraded_fingerprints);
    assert!(degraded_engine.usage().advisory_failures > 0);
}

#[tokio::test]
async fn test_zero_call_side_never_yields_undefined_ratio() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(test_config(), None, sink.clone());

    // Entire uptrend with a put-only chain: PCR is undefined throughout.
    for (i, price) in uptrend_30().iter().enumerate() {
        engine
            .ingest(bar(i as i64, *price).with_chain(chain(0, 50_000)))
            .await;
    }

    let snapshot = engine.latest_snapshot("NIFTY").unwrap();
    assert_eq!(snapshot.pcr, None);

    // Signals still flowed from the other factors, and none of them
    // carries a NaN or infinite value anywhere.
    for signal in sink.delivered.lock().unwrap().iter() {
        assert!(signal.strength.is_finite());
        assert!(signal.snapshot.pcr.is_none());
        assert!(signal.snapshot.vwap.is_finite());
    }
}

#[tokio::test]
async fn test_out_of_order_observations_do_not_change_snapshots() {
    let sink_a = Arc::new(RecordingSink::default());
    let clean = engine(test_config(), None, sink_a);
    let sink_b = Arc::new(RecordingSink::default());
    let noisy = engine(test_config(), None, sink_b);

    let path = uptrend_30();
    for (i, price) in path.iter().enumerate() {
        clean.ingest(bar(i as i64, *price)).await;

        noisy.ingest(bar(i as i64, *price)).await;
        // Replay an older bar after every accepted one.
        if i >= 2 {
            let outcome = noisy.ingest(bar(i as i64 - 2, *price + 500.0)).await;
            assert!(matches!(outcome, IngestOutcome::StaleObservation));
        }
    }

    let clean_snapshot = clean.latest_snapshot("NIFTY").unwrap();
    let noisy_snapshot = noisy.latest_snapshot("NIFTY").unwrap();
    assert_eq!(clean_snapshot.as_of, noisy_snapshot.as_of);
    assert_eq!(clean_snapshot.price, noisy_snapshot.price);
    assert!((clean_snapshot.vwap - noisy_snapshot.vwap).abs() < 1e-9);
    assert_eq!(clean_snapshot.bar_count, noisy_snapshot.bar_count);
    assert_eq!(clean_snapshot.support_levels, noisy_snapshot.support_levels);
    assert_eq!(
        clean_snapshot.resistance_levels,
        noisy_snapshot.resistance_levels
    );
}

#[tokio::test]
async fn test_instruments_are_isolated() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(test_config(), None, sink.clone());

    // NIFTY rallies into a breakout while BANKNIFTY sits flat.
    for (i, price) in uptrend_30().iter().enumerate() {
        engine.ingest(bar(i as i64, *price)).await;
        engine
            .ingest(Observation::sample(
                "BANKNIFTY",
                T0 + i as i64 * 60_000,
                51_000.0,
                500.0,
            ))
            .await;
    }

    let delivered = sink.delivered.lock().unwrap();
    assert!(delivered.iter().all(|s| s.symbol == "NIFTY"));
    assert!(engine.latest_snapshot("BANKNIFTY").is_some());
    assert!(engine
        .recent_signals(Some("BANKNIFTY"), 10)
        .is_empty());
}
