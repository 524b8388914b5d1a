//! Derived indicator snapshots.

use serde::{Deserialize, Serialize};

/// Direction of the short-term price trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl TrendDirection {
    pub fn label(&self) -> &'static str {
        match self {
            TrendDirection::Up => "Up",
            TrendDirection::Down => "Down",
            TrendDirection::Flat => "Flat",
        }
    }
}

/// Aggregate option-chain context carried alongside the price indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainActivity {
    pub total_call_oi: u64,
    pub total_put_oi: u64,
    /// Strike holding the largest call OI (a ceiling writers defend).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_call_oi_strike: Option<u32>,
    /// Strike holding the largest put OI (a floor writers defend).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_put_oi_strike: Option<u32>,
    /// Strike with the largest call OI change since the previous chain,
    /// with the signed percentage change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_call_oi_change: Option<(u32, f64)>,
    /// Strike with the largest put OI change since the previous chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_put_oi_change: Option<(u32, f64)>,
}

/// Immutable indicator state derived from one instrument's observation
/// window. Never mutated after creation; a newer snapshot supersedes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    /// Instrument name.
    pub symbol: String,
    /// Timestamp (ms) of the observation that produced this snapshot.
    pub as_of: i64,
    /// Last price at `as_of`.
    pub price: f64,
    /// Session-cumulative volume weighted average price.
    pub vwap: f64,
    /// Put-call ratio by open interest. `None` when the call side is
    /// empty (undefined, never NaN).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcr: Option<f64>,
    /// Retained swing lows, ascending. At most k levels.
    pub support_levels: Vec<f64>,
    /// Retained swing highs, ascending. At most k levels.
    pub resistance_levels: Vec<f64>,
    /// Nearest retained level below price, either kind. A broken
    /// ceiling acts as the new floor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support: Option<f64>,
    /// Nearest retained level above price, either kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resistance: Option<f64>,
    /// Short-term trend over the configured lookback.
    pub trend: TrendDirection,
    /// Number of observations currently inside the window.
    pub bar_count: usize,
    /// Option-chain context, present once a chain has been seen this
    /// session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainActivity>,
}

impl IndicatorSnapshot {
    /// Percentage deviation of price from VWAP. Positive = above.
    pub fn vwap_deviation_pct(&self) -> f64 {
        if self.vwap > 0.0 {
            (self.price - self.vwap) / self.vwap * 100.0
        } else {
            0.0
        }
    }

    /// Price has cleared every retained swing high.
    pub fn above_all_resistance(&self) -> bool {
        self.resistance_levels
            .last()
            .is_some_and(|top| self.price > *top)
    }

    /// Price has fallen through every retained swing low.
    pub fn below_all_support(&self) -> bool {
        self.support_levels
            .first()
            .is_some_and(|bottom| self.price < *bottom)
    }

    /// The lowest retained swing low.
    pub fn floor(&self) -> Option<f64> {
        self.support_levels.first().copied()
    }

    /// The highest retained swing high.
    pub fn ceiling(&self) -> Option<f64> {
        self.resistance_levels.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(price: f64, vwap: f64, lows: Vec<f64>, highs: Vec<f64>) -> IndicatorSnapshot {
        let support = lows
            .iter()
            .chain(highs.iter())
            .filter(|l| **l < price)
            .cloned()
            .fold(None::<f64>, |acc, l| Some(acc.map_or(l, |a| a.max(l))));
        let resistance = lows
            .iter()
            .chain(highs.iter())
            .filter(|l| **l > price)
            .cloned()
            .fold(None::<f64>, |acc, l| Some(acc.map_or(l, |a| a.min(l))));
        IndicatorSnapshot {
            symbol: "NIFTY".into(),
            as_of: 0,
            price,
            vwap,
            pcr: None,
            support_levels: lows,
            resistance_levels: highs,
            support,
            resistance,
            trend: TrendDirection::Flat,
            bar_count: 30,
            chain: None,
        }
    }

    #[test]
    fn test_vwap_deviation() {
        let snap = snapshot(101.0, 100.0, vec![], vec![]);
        assert!((snap.vwap_deviation_pct() - 1.0).abs() < 1e-9);

        let zero = snapshot(101.0, 0.0, vec![], vec![]);
        assert_eq!(zero.vwap_deviation_pct(), 0.0);
    }

    #[test]
    fn test_breakout_and_breakdown_helpers() {
        let breakout = snapshot(105.0, 100.0, vec![98.0], vec![102.0]);
        assert!(breakout.above_all_resistance());
        assert!(!breakout.below_all_support());

        let breakdown = snapshot(95.0, 100.0, vec![98.0], vec![102.0]);
        assert!(breakdown.below_all_support());
        assert!(!breakdown.above_all_resistance());

        let inside = snapshot(100.0, 100.0, vec![98.0], vec![102.0]);
        assert!(!inside.above_all_resistance());
        assert!(!inside.below_all_support());
        assert_eq!(inside.support, Some(98.0));
        assert_eq!(inside.resistance, Some(102.0));
    }

    #[test]
    fn test_lone_swing_high_is_not_a_floor() {
        // Price under a single swing high: no support to break.
        let snap = snapshot(100.0, 100.0, vec![], vec![104.0]);
        assert!(!snap.below_all_support());
        assert_eq!(snap.floor(), None);
        assert_eq!(snap.ceiling(), Some(104.0));
    }

    #[test]
    fn test_broken_ceiling_becomes_support() {
        let snap = snapshot(105.0, 100.0, vec![98.0], vec![102.0]);
        assert_eq!(snap.support, Some(102.0));
        assert_eq!(snap.resistance, None);
    }
}
