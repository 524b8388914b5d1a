//! Rolling per-instrument indicator state.
//!
//! Each instrument owns a time-bounded window of observations from which
//! support/resistance levels, session VWAP, put-call ratio and trend are
//! derived incrementally. State is partitioned by instrument in a
//! `DashMap`, so different instruments update independently while a
//! single instrument's updates serialize on its map entry.

use crate::config::WindowConfig;
use crate::services::session::{millis_to_utc, SessionClock};
use crate::types::{ChainActivity, ChainSnapshot, IndicatorSnapshot, Observation, TrendDirection};
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// One accepted observation inside the window.
#[derive(Debug, Clone, Copy)]
struct Bar {
    timestamp: i64,
    price: f64,
    volume: f64,
}

/// Kahan-compensated running sum. The VWAP accumulators live for a whole
/// session of repeated small additions, where naive summation drifts.
#[derive(Debug, Default, Clone, Copy)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    fn value(&self) -> f64 {
        self.sum
    }
}

/// Session-cumulative VWAP state.
#[derive(Debug, Default)]
struct VwapAccumulator {
    price_volume: CompensatedSum,
    volume: CompensatedSum,
}

impl VwapAccumulator {
    fn add(&mut self, price: f64, volume: f64) {
        self.price_volume.add(price * volume);
        self.volume.add(volume);
    }

    /// Falls back to the given price while no volume has traded.
    fn value_or(&self, fallback: f64) -> f64 {
        if self.volume.value() > 0.0 {
            self.price_volume.value() / self.volume.value()
        } else {
            fallback
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Option-chain derived state, kept across updates within a session.
#[derive(Debug, Default)]
struct ChainState {
    /// strike -> (call_oi, put_oi) from the previous chain snapshot.
    previous_oi: HashMap<u32, (u64, u64)>,
    pcr: Option<f64>,
    activity: Option<ChainActivity>,
}

impl ChainState {
    fn ingest(&mut self, chain: &ChainSnapshot) {
        let (total_call_oi, total_put_oi) = chain.total_oi();

        // Undefined rather than infinite when the call side is empty.
        self.pcr = if total_call_oi > 0 {
            Some(total_put_oi as f64 / total_call_oi as f64)
        } else {
            None
        };

        let max_call_oi_strike = chain
            .strikes
            .iter()
            .max_by_key(|s| s.call_oi)
            .filter(|s| s.call_oi > 0)
            .map(|s| s.strike);
        let max_put_oi_strike = chain
            .strikes
            .iter()
            .max_by_key(|s| s.put_oi)
            .filter(|s| s.put_oi > 0)
            .map(|s| s.strike);

        let mut top_call_change: Option<(u32, f64)> = None;
        let mut top_put_change: Option<(u32, f64)> = None;
        for strike in &chain.strikes {
            if let Some((prev_call, prev_put)) = self.previous_oi.get(&strike.strike) {
                if *prev_call > 0 {
                    let change = (strike.call_oi as f64 - *prev_call as f64) / *prev_call as f64 * 100.0;
                    if top_call_change.map_or(true, |(_, c)| change.abs() > c.abs()) {
                        top_call_change = Some((strike.strike, change));
                    }
                }
                if *prev_put > 0 {
                    let change = (strike.put_oi as f64 - *prev_put as f64) / *prev_put as f64 * 100.0;
                    if top_put_change.map_or(true, |(_, c)| change.abs() > c.abs()) {
                        top_put_change = Some((strike.strike, change));
                    }
                }
            }
        }

        self.previous_oi = chain
            .strikes
            .iter()
            .map(|s| (s.strike, (s.call_oi, s.put_oi)))
            .collect();

        self.activity = Some(ChainActivity {
            total_call_oi,
            total_put_oi,
            max_call_oi_strike,
            max_put_oi_strike,
            top_call_oi_change: top_call_change,
            top_put_oi_change: top_put_change,
        });
    }
}

/// Per-instrument mutable state.
#[derive(Debug, Default)]
struct InstrumentState {
    window: VecDeque<Bar>,
    last_timestamp: i64,
    session: Option<NaiveDate>,
    vwap: VwapAccumulator,
    chain: ChainState,
    stale_drops: u64,
}

/// Store maintaining rolling indicator state for every instrument.
pub struct IndicatorStore {
    config: WindowConfig,
    clock: Arc<dyn SessionClock>,
    states: DashMap<String, InstrumentState>,
}

impl IndicatorStore {
    pub fn new(config: WindowConfig, clock: Arc<dyn SessionClock>) -> Self {
        Self {
            config,
            clock,
            states: DashMap::new(),
        }
    }

    /// Fold one observation into the instrument's window.
    ///
    /// Returns `None` without touching state for out-of-session or
    /// stale/duplicate observations, and `None` (after recording) while
    /// the window is still warming up. A `Some` snapshot supersedes any
    /// previous snapshot for the instrument.
    pub fn update(&self, observation: Observation) -> Option<IndicatorSnapshot> {
        let session = self.clock.session_date(millis_to_utc(observation.timestamp))?;

        let mut state = self.states.entry(observation.symbol.clone()).or_default();

        // Monotonicity: anything at or before the last accepted timestamp
        // is an idempotent no-op, not an error.
        if !state.window.is_empty() && observation.timestamp <= state.last_timestamp {
            state.stale_drops += 1;
            trace!(
                symbol = %observation.symbol,
                timestamp = observation.timestamp,
                "dropping stale observation"
            );
            return None;
        }

        // New trading day: session-cumulative state starts over.
        if state.session != Some(session) {
            if state.session.is_some() {
                debug!(symbol = %observation.symbol, %session, "session boundary, resetting accumulators");
            }
            state.session = Some(session);
            state.vwap.reset();
            state.chain = ChainState::default();
        }

        state.last_timestamp = observation.timestamp;
        state.vwap.add(observation.price, observation.volume);
        if let Some(ref chain) = observation.chain {
            state.chain.ingest(chain);
        }

        state.window.push_back(Bar {
            timestamp: observation.timestamp,
            price: observation.price,
            volume: observation.volume,
        });

        // Evict by trailing time span, not count.
        let horizon = observation.timestamp - self.config.span_secs * 1000;
        while state.window.front().is_some_and(|bar| bar.timestamp < horizon) {
            state.window.pop_front();
        }

        if state.window.len() < self.config.min_bars {
            return None;
        }

        Some(self.snapshot_from(&state, &observation))
    }

    fn snapshot_from(&self, state: &InstrumentState, observation: &Observation) -> IndicatorSnapshot {
        let price = observation.price;
        let (support_levels, resistance_levels) = self.extract_levels(&state.window, price);

        // Nearest level on each side of price, either kind: a broken
        // ceiling acts as the new floor and vice versa.
        let support = support_levels
            .iter()
            .chain(resistance_levels.iter())
            .filter(|l| **l < price)
            .cloned()
            .fold(None::<f64>, |acc, l| Some(acc.map_or(l, |a| a.max(l))));
        let resistance = support_levels
            .iter()
            .chain(resistance_levels.iter())
            .filter(|l| **l > price)
            .cloned()
            .fold(None::<f64>, |acc, l| Some(acc.map_or(l, |a| a.min(l))));

        IndicatorSnapshot {
            symbol: observation.symbol.clone(),
            as_of: observation.timestamp,
            price,
            vwap: state.vwap.value_or(price),
            pcr: state.chain.pcr,
            support_levels,
            resistance_levels,
            support,
            resistance,
            trend: self.trend(&state.window),
            bar_count: state.window.len(),
            chain: state.chain.activity.clone(),
        }
    }

    /// Confirmed local extrema over the window, split into swing lows
    /// (supports) and swing highs (resistances), deduplicated within an
    /// epsilon band, keeping at most `max_levels` of the most recently
    /// formed per kind. Both lists are returned ascending.
    fn extract_levels(&self, window: &VecDeque<Bar>, price: f64) -> (Vec<f64>, Vec<f64>) {
        let lookback = self.config.level_lookback;
        let n = window.len();
        if n < 2 * lookback + 1 {
            return (Vec::new(), Vec::new());
        }

        let prices: Vec<f64> = window.iter().map(|b| b.price).collect();

        // Newest first so dedup keeps the most recent instance of a level.
        let mut high_candidates: Vec<f64> = Vec::new();
        let mut low_candidates: Vec<f64> = Vec::new();
        for i in (lookback..n - lookback).rev() {
            let p = prices[i];
            let neighborhood = &prices[i - lookback..=i + lookback];
            let is_max = neighborhood.iter().all(|q| *q <= p);
            let is_min = neighborhood.iter().all(|q| *q >= p);
            // A point that is both sits in a flat stretch, not a swing.
            if is_max && !is_min {
                high_candidates.push(p);
            } else if is_min && !is_max {
                low_candidates.push(p);
            }
        }

        let epsilon = price * self.config.level_epsilon_pct / 100.0;
        let dedup = |candidates: Vec<f64>| -> Vec<f64> {
            let mut distinct: Vec<f64> = Vec::new();
            for candidate in candidates {
                if distinct.len() == self.config.max_levels {
                    break;
                }
                if !distinct.iter().any(|kept| (kept - candidate).abs() <= epsilon) {
                    distinct.push(candidate);
                }
            }
            distinct.sort_by(f64::total_cmp);
            distinct
        };

        (dedup(low_candidates), dedup(high_candidates))
    }

    fn trend(&self, window: &VecDeque<Bar>) -> TrendDirection {
        let n = window.len();
        if n < 2 {
            return TrendDirection::Flat;
        }
        let back = self.config.trend_lookback.min(n - 1);
        let reference = window[n - 1 - back].price;
        let last = window[n - 1].price;
        if reference <= 0.0 {
            return TrendDirection::Flat;
        }
        let change_pct = (last - reference) / reference * 100.0;
        if change_pct > self.config.trend_threshold_pct {
            TrendDirection::Up
        } else if change_pct < -self.config.trend_threshold_pct {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        }
    }

    /// Last accepted timestamp for an instrument, if any.
    pub fn last_timestamp(&self, symbol: &str) -> Option<i64> {
        self.states
            .get(symbol)
            .filter(|s| !s.window.is_empty())
            .map(|s| s.last_timestamp)
    }

    /// Observations currently held for an instrument.
    pub fn bar_count(&self, symbol: &str) -> usize {
        self.states.get(symbol).map(|s| s.window.len()).unwrap_or(0)
    }

    /// Stale/duplicate observations dropped for an instrument.
    pub fn stale_drops(&self, symbol: &str) -> u64 {
        self.states.get(symbol).map(|s| s.stale_drops).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrikeEntry;
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};

    /// Clock that treats every timestamp as in-session on its UTC date.
    struct AlwaysOpen;

    impl SessionClock for AlwaysOpen {
        fn is_open(&self, _now: DateTime<Utc>) -> bool {
            true
        }
        fn session_date(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
            Some(now.date_naive())
        }
    }

    fn store() -> IndicatorStore {
        let config = WindowConfig {
            min_bars: 5,
            ..WindowConfig::default()
        };
        IndicatorStore::new(config, Arc::new(AlwaysOpen))
    }

    fn obs(ts: i64, price: f64, volume: f64) -> Observation {
        Observation::sample("NIFTY", ts, price, volume)
    }

    fn strike(strike: u32, call_oi: u64, put_oi: u64) -> StrikeEntry {
        StrikeEntry {
            strike,
            call_oi,
            put_oi,
            call_volume: 0,
            put_volume: 0,
            call_ltp: 0.0,
            put_ltp: 0.0,
            call_iv: None,
            put_iv: None,
        }
    }

    const T0: i64 = 1_786_500_000_000; // fixed in-session base timestamp

    #[test]
    fn test_cold_start_returns_none() {
        let store = store();
        for i in 0..4 {
            assert!(store.update(obs(T0 + i * 60_000, 100.0 + i as f64, 10.0)).is_none());
        }
        assert!(store.update(obs(T0 + 4 * 60_000, 104.0, 10.0)).is_some());
    }

    #[test]
    fn test_stale_observations_are_noops() {
        let store = store();
        let mut in_order = Vec::new();
        for i in 0..10 {
            in_order.push(store.update(obs(T0 + i * 60_000, 100.0 + i as f64, 10.0)));
        }
        let last = in_order.last().unwrap().clone().unwrap();

        // Replays and out-of-order arrivals change nothing.
        assert!(store.update(obs(T0 + 9 * 60_000, 200.0, 999.0)).is_none());
        assert!(store.update(obs(T0 + 3 * 60_000, 5.0, 999.0)).is_none());
        assert_eq!(store.stale_drops("NIFTY"), 2);
        assert_eq!(store.last_timestamp("NIFTY"), Some(T0 + 9 * 60_000));

        // The next in-order bar produces the same snapshot as if the
        // stale ones had never arrived.
        let next = store.update(obs(T0 + 10 * 60_000, 110.0, 10.0)).unwrap();
        assert_eq!(next.bar_count, last.bar_count + 1);
        assert!((next.vwap - expected_vwap(11)).abs() < 1e-9);
    }

    fn expected_vwap(bars: i64) -> f64 {
        // Bars are (100 + i) at equal volume.
        let total: f64 = (0..bars).map(|i| 100.0 + i as f64).sum();
        total / bars as f64
    }

    #[test]
    fn test_incremental_vwap_matches_batch() {
        let store = store();
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0).collect();
        let volumes: Vec<f64> = (0..50).map(|i| 1_000.0 + (i % 7) as f64 * 130.0).collect();

        let mut last = None;
        for i in 0..50 {
            last = store.update(obs(T0 + i as i64 * 60_000, prices[i], volumes[i])).or(last);
        }

        let batch_pv: f64 = prices.iter().zip(&volumes).map(|(p, v)| p * v).sum();
        let batch_v: f64 = volumes.iter().sum();
        let batch_vwap = batch_pv / batch_v;
        assert!((last.unwrap().vwap - batch_vwap).abs() < 1e-9);
    }

    #[test]
    fn test_vwap_resets_at_session_boundary() {
        let store = store();
        for i in 0..10 {
            store.update(obs(T0 + i * 60_000, 100.0, 10.0));
        }

        // Next trading day: only the new day's bars contribute.
        let next_day = T0 + 24 * 3600 * 1000;
        let mut snap = None;
        for i in 0..10 {
            snap = store.update(obs(next_day + i * 60_000, 200.0, 10.0)).or(snap);
        }
        assert!((snap.unwrap().vwap - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_session_observations_ignored() {
        let config = WindowConfig {
            min_bars: 1,
            ..WindowConfig::default()
        };
        let store = IndicatorStore::new(
            config,
            Arc::new(crate::services::session::IstSessionClock::new()),
        );

        // 2026-08-07 03:00 IST — hours before the open.
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let closed = offset
            .with_ymd_and_hms(2026, 8, 7, 3, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert!(store.update(obs(closed, 100.0, 10.0)).is_none());
        assert_eq!(store.bar_count("NIFTY"), 0);
    }

    #[test]
    fn test_pcr_undefined_with_zero_call_oi() {
        let store = store();
        let chain = ChainSnapshot {
            expiry: "2026-08-13".into(),
            strikes: vec![strike(22_900, 0, 500), strike(23_000, 0, 800)],
        };
        let mut snap = None;
        for i in 0..6 {
            let mut o = obs(T0 + i * 60_000, 100.0, 10.0);
            if i == 5 {
                o = o.with_chain(chain.clone());
            }
            snap = store.update(o).or(snap);
        }
        let snap = snap.unwrap();
        assert_eq!(snap.pcr, None);
        let chain = snap.chain.unwrap();
        assert_eq!(chain.total_put_oi, 1_300);
        assert_eq!(chain.max_call_oi_strike, None);
    }

    #[test]
    fn test_pcr_from_chain_totals() {
        let store = store();
        let chain = ChainSnapshot {
            expiry: "2026-08-13".into(),
            strikes: vec![strike(22_900, 400, 600), strike(23_000, 600, 900)],
        };
        let mut snap = None;
        for i in 0..6 {
            let o = obs(T0 + i * 60_000, 100.0, 10.0).with_chain(chain.clone());
            snap = store.update(o).or(snap);
        }
        assert!((snap.unwrap().pcr.unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_oi_change_tracked_between_chains() {
        let store = store();
        let first = ChainSnapshot {
            expiry: "2026-08-13".into(),
            strikes: vec![strike(23_000, 1_000, 1_000)],
        };
        let second = ChainSnapshot {
            expiry: "2026-08-13".into(),
            strikes: vec![strike(23_000, 1_200, 900)],
        };
        for i in 0..6 {
            store.update(obs(T0 + i * 60_000, 100.0, 10.0).with_chain(first.clone()));
        }
        let snap = store
            .update(obs(T0 + 6 * 60_000, 100.0, 10.0).with_chain(second))
            .unwrap();
        let chain = snap.chain.unwrap();
        let (strike_id, change) = chain.top_call_oi_change.unwrap();
        assert_eq!(strike_id, 23_000);
        assert!((change - 20.0).abs() < 1e-9);
        let (_, put_change) = chain.top_put_oi_change.unwrap();
        assert!((put_change + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_levels_found_at_swing_points() {
        let config = WindowConfig {
            min_bars: 5,
            level_lookback: 2,
            ..WindowConfig::default()
        };
        let store = IndicatorStore::new(config, Arc::new(AlwaysOpen));

        // Rise to 105, dip to 101, rally through the old high.
        let path = [100.0, 102.0, 104.0, 105.0, 104.0, 102.0, 101.0, 102.0, 103.0, 104.0];
        let mut snap = None;
        for (i, price) in path.iter().enumerate() {
            snap = store.update(obs(T0 + i as i64 * 60_000, *price, 10.0)).or(snap);
        }
        let snap = snap.unwrap();
        assert_eq!(snap.resistance_levels, vec![105.0]);
        assert_eq!(snap.support_levels, vec![101.0]);
        assert_eq!(snap.support, Some(101.0));
        assert_eq!(snap.resistance, Some(105.0));
    }

    #[test]
    fn test_nearby_levels_deduplicated() {
        let config = WindowConfig {
            min_bars: 5,
            level_lookback: 1,
            level_epsilon_pct: 0.5,
            ..WindowConfig::default()
        };
        let store = IndicatorStore::new(config, Arc::new(AlwaysOpen));

        // Two swing highs 0.2% apart collapse into one level.
        let path = [100.0, 104.9, 100.0, 105.1, 100.0, 101.0, 100.5];
        let mut snap = None;
        for (i, price) in path.iter().enumerate() {
            snap = store.update(obs(T0 + i as i64 * 60_000, *price, 10.0)).or(snap);
        }
        let snap = snap.unwrap();
        let highs = snap.resistance_levels.iter().filter(|l| **l > 103.0).count();
        assert_eq!(highs, 1, "levels: {:?}", snap.resistance_levels);
    }

    #[test]
    fn test_window_evicts_by_time() {
        let config = WindowConfig {
            span_secs: 300,
            min_bars: 1,
            ..WindowConfig::default()
        };
        let store = IndicatorStore::new(config, Arc::new(AlwaysOpen));
        for i in 0..10 {
            store.update(obs(T0 + i * 60_000, 100.0, 10.0));
        }
        // 300s span at 60s spacing keeps at most 6 bars.
        assert!(store.bar_count("NIFTY") <= 6);
    }

    #[test]
    fn test_trend_direction() {
        {
            let store = store();
            let mut snap = None;
            for i in 0..20 {
                snap = store.update(obs(T0 + i * 60_000, 100.0 + i as f64, 10.0)).or(snap);
            }
            assert_eq!(snap.unwrap().trend, TrendDirection::Up);
        }

        {
            let store = store();
            let mut snap = None;
            for i in 0..20 {
                snap = store.update(obs(T0 + i * 60_000, 200.0 - i as f64, 10.0)).or(snap);
            }
            assert_eq!(snap.unwrap().trend, TrendDirection::Down);
        }
    }
}
