//! AI advisory client.
//!
//! Wraps a Gemini-style generative API as a fallible, rate-limited
//! oracle. The engine treats every failure mode here the same way: no
//! opinion this cycle, proceed rule-only.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{AiBias, AiOpinion, IndicatorSnapshot};

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Why an advisory call produced no opinion.
#[derive(Error, Debug)]
pub enum AdvisoryError {
    #[error("advisory request timed out")]
    Timeout,
    #[error("advisory quota exhausted")]
    QuotaExhausted,
    #[error("advisory API returned {0}")]
    Api(StatusCode),
    #[error("advisory response was not parseable: {0}")]
    Malformed(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Capability interface for requesting one qualitative judgment per
/// snapshot. Implementations must bound their own request time; callers
/// additionally enforce an outer timeout.
#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    async fn request_opinion(
        &self,
        snapshot: &IndicatorSnapshot,
    ) -> Result<AiOpinion, AdvisoryError>;
}

/// The model's structured verdict, as instructed by the prompt.
#[derive(Debug, Deserialize, Serialize)]
struct GeminiVerdict {
    signal: String,
    /// 0-100 per the prompt contract.
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Gemini generateContent binding.
pub struct GeminiAdvisor {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiAdvisor {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            model,
        }
    }

    fn build_prompt(snapshot: &IndicatorSnapshot) -> String {
        let pcr = snapshot
            .pcr
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "undefined".to_string());
        let support = snapshot
            .support
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "none".to_string());
        let resistance = snapshot
            .resistance
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "none".to_string());
        let chain_context = snapshot
            .chain
            .as_ref()
            .map(|c| {
                format!(
                    "- Total Call OI: {}\n- Total Put OI: {}\n- Max Call OI strike: {}\n- Max Put OI strike: {}",
                    c.total_call_oi,
                    c.total_put_oi,
                    c.max_call_oi_strike.map(|s| s.to_string()).unwrap_or_else(|| "n/a".into()),
                    c.max_put_oi_strike.map(|s| s.to_string()).unwrap_or_else(|| "n/a".into()),
                )
            })
            .unwrap_or_else(|| "- No option chain data this cycle".to_string());

        format!(
            r#"You are an expert {symbol} index options trader. Analyze the live data and give a balanced, data-driven judgment. Favor BULLISH when PCR is low and price holds above VWAP; favor BEARISH when PCR is high and price sits below VWAP. Use NEUTRAL only when the picture is truly mixed.

## CURRENT MARKET DATA:
- Spot price: {price:.2}
- Session VWAP: {vwap:.2} (price is {dev:+.2}% from VWAP)
- Put-Call Ratio (OI): {pcr}
- Support: {support}
- Resistance: {resistance}
- Short-term trend: {trend}
{chain_context}

## RESPOND IN THIS EXACT JSON FORMAT ONLY:
{{
    "signal": "BULLISH" | "BEARISH" | "NEUTRAL",
    "confidence": <0-100>,
    "reasoning": "<3-5 numbered factors with specific values>"
}}"#,
            symbol = snapshot.symbol,
            price = snapshot.price,
            vwap = snapshot.vwap,
            dev = snapshot.vwap_deviation_pct(),
            pcr = pcr,
            support = support,
            resistance = resistance,
            trend = snapshot.trend.label(),
            chain_context = chain_context,
        )
    }

    /// Pull the JSON verdict out of model text that may be wrapped in
    /// markdown code fences.
    fn parse_verdict(text: &str) -> Result<GeminiVerdict, AdvisoryError> {
        let trimmed = text.trim();
        let body = if let Some(rest) = trimmed.split("```json").nth(1) {
            rest.split("```").next().unwrap_or(rest)
        } else if let Some(rest) = trimmed.split("```").nth(1) {
            rest
        } else {
            trimmed
        };

        serde_json::from_str(body.trim()).map_err(|e| AdvisoryError::Malformed(e.to_string()))
    }

    fn verdict_to_opinion(verdict: GeminiVerdict, generated_at: i64) -> AiOpinion {
        let bias = match verdict.signal.to_uppercase().as_str() {
            "BULLISH" | "CALL" => AiBias::Bullish,
            "BEARISH" | "PUT" => AiBias::Bearish,
            _ => AiBias::Neutral,
        };
        AiOpinion::new(bias, verdict.confidence / 100.0, verdict.reasoning, generated_at)
    }
}

#[async_trait]
impl AdvisoryClient for GeminiAdvisor {
    async fn request_opinion(
        &self,
        snapshot: &IndicatorSnapshot,
    ) -> Result<AiOpinion, AdvisoryError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_URL, self.model, self.api_key
        );
        let payload = json!({
            "contents": [{
                "parts": [{ "text": Self::build_prompt(snapshot) }]
            }],
            "generationConfig": {
                "temperature": 0.3,
                "topP": 0.8,
                "maxOutputTokens": 1024,
            }
        });

        let response = self.client.post(&url).json(&payload).send().await.map_err(|e| {
            if e.is_timeout() {
                AdvisoryError::Timeout
            } else {
                AdvisoryError::Transport(e)
            }
        })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => return Err(AdvisoryError::QuotaExhausted),
            status => {
                warn!(%status, "advisory API error");
                return Err(AdvisoryError::Api(status));
            }
        }

        let body: serde_json::Value = response.json().await?;
        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| AdvisoryError::Malformed("no candidate text".to_string()))?;

        let verdict = Self::parse_verdict(text)?;
        debug!(
            symbol = %snapshot.symbol,
            signal = %verdict.signal,
            confidence = verdict.confidence,
            "advisory verdict"
        );
        Ok(Self::verdict_to_opinion(verdict, snapshot.as_of))
    }
}
