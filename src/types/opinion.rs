//! Advisory opinions returned by the AI client.

use serde::{Deserialize, Serialize};

use crate::types::TrendDirection;

/// Directional bias expressed by the advisory model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiBias {
    Bullish,
    Bearish,
    Neutral,
}

impl AiBias {
    pub fn label(&self) -> &'static str {
        match self {
            AiBias::Bullish => "Bullish",
            AiBias::Bearish => "Bearish",
            AiBias::Neutral => "Neutral",
        }
    }

    /// Whether this bias points the same way as a price trend.
    pub fn agrees_with_trend(&self, trend: TrendDirection) -> bool {
        matches!(
            (self, trend),
            (AiBias::Bullish, TrendDirection::Up) | (AiBias::Bearish, TrendDirection::Down)
        )
    }
}

/// A qualitative judgment for one indicator snapshot.
///
/// Held only while evaluating a single strategy decision; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiOpinion {
    pub bias: AiBias,
    /// Model confidence, normalized to 0..1.
    pub confidence: f64,
    /// Free-text explanation from the model.
    pub rationale: String,
    /// Unix timestamp (ms) when the opinion was produced.
    pub generated_at: i64,
}

impl AiOpinion {
    pub fn new(bias: AiBias, confidence: f64, rationale: impl Into<String>, generated_at: i64) -> Self {
        Self {
            bias,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
            generated_at,
        }
    }
}
