//! Strategy evaluator.
//!
//! A pure function from indicator state (plus an optional advisory
//! opinion) to a candidate signal. The rule layer is complete on its
//! own; the advisory layer can only raise conviction or wake up a weak
//! hold, never mute a risk signal.

use crate::config::StrategyConfig;
use crate::types::{
    AiBias, AiOpinion, IndicatorSnapshot, Signal, SignalAction, TrendDirection,
};

/// Additive factor weights for the rule score. A clean setup where
/// sentiment, momentum, structure and trend all agree sums to 1.0.
const PCR_WEIGHT: f64 = 0.25;
const VWAP_WEIGHT: f64 = 0.20;
const STRUCTURE_WEIGHT: f64 = 0.35;
const TREND_WEIGHT: f64 = 0.20;

/// Rule-based strategy evaluator with optional advisory blending.
pub struct StrategyEvaluator {
    config: StrategyConfig,
}

impl StrategyEvaluator {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Evaluate one snapshot into at most one signal.
    ///
    /// Returns `None` when the blended outcome is a hold weaker than the
    /// noise floor — no-signal is the common case, not a failure.
    pub fn evaluate(
        &self,
        snapshot: &IndicatorSnapshot,
        opinion: Option<&AiOpinion>,
    ) -> Option<Signal> {
        // Risk layer first: a broken structure is never negotiable.
        if let Some(signal) = self.exit_signal(snapshot) {
            return Some(signal);
        }

        let (score, mut reasons) = self.rule_score(snapshot);

        let mut action = if score >= self.config.entry_threshold {
            SignalAction::Buy
        } else if score <= -self.config.entry_threshold {
            SignalAction::Sell
        } else {
            SignalAction::Hold
        };
        let mut strength = score.abs().min(1.0);

        // Advisory blending: agreement adds conviction, high-confidence
        // agreement with the trend can wake a hold, disagreement changes
        // nothing.
        let mut blended_opinion = None;
        if let Some(op) = opinion {
            if op.confidence >= self.config.ai_confidence_floor {
                let boost = self.config.ai_weight * op.confidence;
                match action {
                    SignalAction::Buy if op.bias == AiBias::Bullish => {
                        strength = (strength + boost).min(1.0);
                        reasons.push(format!(
                            "Advisory agrees ({} at {:.0}% confidence)",
                            op.bias.label(),
                            op.confidence * 100.0
                        ));
                        blended_opinion = Some(op.clone());
                    }
                    SignalAction::Sell if op.bias == AiBias::Bearish => {
                        strength = (strength + boost).min(1.0);
                        reasons.push(format!(
                            "Advisory agrees ({} at {:.0}% confidence)",
                            op.bias.label(),
                            op.confidence * 100.0
                        ));
                        blended_opinion = Some(op.clone());
                    }
                    SignalAction::Hold if op.bias.agrees_with_trend(snapshot.trend) => {
                        action = match op.bias {
                            AiBias::Bullish => SignalAction::Buy,
                            AiBias::Bearish => SignalAction::Sell,
                            AiBias::Neutral => unreachable!("neutral never agrees with a trend"),
                        };
                        strength = (strength + boost).min(1.0);
                        reasons.push(format!(
                            "Advisory upgrade: {} at {:.0}% confidence with the {} trend",
                            op.bias.label(),
                            op.confidence * 100.0,
                            snapshot.trend.label()
                        ));
                        blended_opinion = Some(op.clone());
                    }
                    _ => {}
                }
            }
        }

        if action == SignalAction::Hold && strength < self.config.noise_floor {
            return None;
        }

        Some(Signal::new(snapshot.clone(), action, strength, reasons, blended_opinion))
    }

    /// Exit fires when price has broken structure against the prevailing
    /// trend: through every swing low in an uptrend (longs lose their
    /// floor), or through every swing high in a downtrend (shorts lose
    /// their ceiling).
    fn exit_signal(&self, snapshot: &IndicatorSnapshot) -> Option<Signal> {
        let (breached, reason) = match snapshot.trend {
            TrendDirection::Up if snapshot.below_all_support() => {
                let floor = snapshot.floor()?;
                (
                    (floor - snapshot.price) / floor * 100.0,
                    format!("Uptrend floor at {:.2} broken ({:.2})", floor, snapshot.price),
                )
            }
            TrendDirection::Down if snapshot.above_all_resistance() => {
                let ceiling = snapshot.ceiling()?;
                (
                    (snapshot.price - ceiling) / ceiling * 100.0,
                    format!("Downtrend ceiling at {:.2} broken ({:.2})", ceiling, snapshot.price),
                )
            }
            _ => return None,
        };

        // Severity scales with the breach; even a marginal break clears
        // the noise floor so exits always reach the gate.
        let strength = (0.5 + breached).clamp(0.5, 1.0);
        Some(Signal::new(
            snapshot.clone(),
            SignalAction::Exit,
            strength,
            vec![reason],
            None,
        ))
    }

    /// Additive rule score in [-1, 1]; positive is bullish.
    fn rule_score(&self, snapshot: &IndicatorSnapshot) -> (f64, Vec<String>) {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        // Sentiment: PCR crossing the configured thresholds. An
        // undefined ratio (empty call side) contributes nothing.
        if let Some(pcr) = snapshot.pcr {
            if pcr < self.config.pcr_bullish {
                score += PCR_WEIGHT;
                reasons.push(format!("Low PCR ({:.2}) reads bullish", pcr));
            } else if pcr > self.config.pcr_bearish {
                score -= PCR_WEIGHT;
                reasons.push(format!("High PCR ({:.2}) reads bearish", pcr));
            }
        }

        // Momentum: deviation from session VWAP.
        let deviation = snapshot.vwap_deviation_pct();
        if deviation > self.config.vwap_deviation_pct {
            score += VWAP_WEIGHT;
            reasons.push(format!("Price {:.2}% above VWAP", deviation));
        } else if deviation < -self.config.vwap_deviation_pct {
            score -= VWAP_WEIGHT;
            reasons.push(format!("Price {:.2}% below VWAP", deviation.abs()));
        }

        // Structure: position relative to the retained levels.
        if snapshot.above_all_resistance() {
            score += STRUCTURE_WEIGHT;
            reasons.push(format!(
                "Breakout above resistance at {:.2}",
                snapshot.ceiling().unwrap_or(snapshot.price)
            ));
        } else if snapshot.below_all_support() {
            score -= STRUCTURE_WEIGHT;
            reasons.push(format!(
                "Breakdown below support at {:.2}",
                snapshot.floor().unwrap_or(snapshot.price)
            ));
        }

        // Trend confirmation.
        match snapshot.trend {
            TrendDirection::Up => {
                score += TREND_WEIGHT;
                reasons.push("Short-term trend up".to_string());
            }
            TrendDirection::Down => {
                score -= TREND_WEIGHT;
                reasons.push("Short-term trend down".to_string());
            }
            TrendDirection::Flat => {}
        }

        (score.clamp(-1.0, 1.0), reasons)
    }
}
