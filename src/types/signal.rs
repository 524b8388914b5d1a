//! Trading signals and their deduplication fingerprints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AiOpinion, IndicatorSnapshot};

/// Action recommended by the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
    /// Risk-off: the structure backing an earlier entry has broken.
    /// Never suppressed or overridden by the advisory layer.
    Exit,
}

impl SignalAction {
    pub fn label(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
            SignalAction::Exit => "EXIT",
        }
    }

    /// Whether this action opens exposure in a direction.
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalAction::Buy | SignalAction::Sell)
    }
}

/// Stable key used by the alert gate for deduplication.
///
/// Two signals with equal fingerprints are the "same" alert for cooldown
/// purposes. The strength bucket is optional so that near-identical
/// strengths don't defeat deduplication unless explicitly requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub symbol: String,
    pub action: SignalAction,
    /// Strength rounded to tenths, when bucketing is enabled.
    pub strength_bucket: Option<u8>,
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.strength_bucket {
            Some(b) => write!(f, "{}:{}:{}", self.symbol, self.action.label(), b),
            None => write!(f, "{}:{}", self.symbol, self.action.label()),
        }
    }
}

/// A discrete trading signal. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub action: SignalAction,
    /// Conviction, 0..1.
    pub strength: f64,
    /// Human-readable factors that triggered this signal.
    pub reasons: Vec<String>,
    /// The snapshot this signal was derived from.
    pub snapshot: IndicatorSnapshot,
    /// Advisory opinion blended in, if one was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opinion: Option<AiOpinion>,
    /// Unix timestamp (ms) when constructed.
    pub created_at: i64,
}

impl Signal {
    pub fn new(
        snapshot: IndicatorSnapshot,
        action: SignalAction,
        strength: f64,
        reasons: Vec<String>,
        opinion: Option<AiOpinion>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: snapshot.symbol.clone(),
            action,
            strength: strength.clamp(0.0, 1.0),
            reasons,
            created_at: snapshot.as_of,
            snapshot,
            opinion,
        }
    }

    /// Deduplication key for the alert gate.
    pub fn fingerprint(&self, bucket_strength: bool) -> Fingerprint {
        Fingerprint {
            symbol: self.symbol.clone(),
            action: self.action,
            strength_bucket: bucket_strength.then(|| (self.strength * 10.0).round() as u8),
        }
    }
}
