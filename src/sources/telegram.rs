//! Dispatch sinks.
//!
//! A sink delivers an accepted signal to the outside world with
//! at-most-once semantics: failures are logged, never retried, because
//! the alert gate has already transitioned to Cooling.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{Signal, SignalAction};

const TELEGRAM_URL: &str = "https://api.telegram.org";

/// Delivery failure. The engine logs it and moves on.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink rejected the message: {0}")]
    Rejected(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Delivery surface for accepted signals.
#[async_trait]
pub trait DispatchSink: Send + Sync {
    /// Deliver one signal. At-most-once; do not retry internally.
    async fn deliver(&self, signal: &Signal) -> Result<(), SinkError>;

    /// Out-of-band system notice (startup, shutdown). Best effort.
    async fn announce(&self, _text: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Telegram Bot API sink, HTML formatting.
pub struct TelegramSink {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            chat_id,
        }
    }

    async fn send_message(&self, text: &str) -> Result<(), SinkError> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_URL, self.bot_token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Rejected(format!("{}: {}", status, body)))
        }
    }

    /// Render a signal in the alert layout the bot has always used.
    pub fn format_alert(signal: &Signal) -> String {
        let (emoji, headline) = match signal.action {
            SignalAction::Buy => ("\u{1F7E2}", "BUY SIGNAL"),
            SignalAction::Sell => ("\u{1F534}", "SELL SIGNAL"),
            SignalAction::Exit => ("\u{26A0}", "EXIT SIGNAL"),
            SignalAction::Hold => ("\u{26AA}", "HOLD"),
        };

        let snapshot = &signal.snapshot;
        let pcr = snapshot
            .pcr
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "n/a".to_string());
        let support = snapshot
            .support
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".to_string());
        let resistance = snapshot
            .resistance
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "-".to_string());

        let reasons = signal
            .reasons
            .iter()
            .map(|r| format!("\u{2022} {}", r))
            .collect::<Vec<_>>()
            .join("\n");

        let advisory = signal
            .opinion
            .as_ref()
            .map(|op| {
                format!(
                    "\n<b>\u{1F916} ADVISORY ({} {:.0}%)</b>\n{}\n",
                    op.bias.label(),
                    op.confidence * 100.0,
                    op.rationale
                )
            })
            .unwrap_or_default();

        format!(
            "{emoji} <b>{symbol} {headline}</b> {emoji}\n\n\
             \u{1F3AF} <b>Strength: {strength:.0}%</b>\n\n\
             <b>\u{1F4C8} MARKET CONTEXT</b>\n\
             \u{2022} Spot: {price:.2}\n\
             \u{2022} VWAP: {vwap:.2}\n\
             \u{2022} PCR: {pcr}\n\
             \u{2022} Support: {support}\n\
             \u{2022} Resistance: {resistance}\n\
             \u{2022} Trend: {trend}\n\n\
             <b>\u{1F4A1} FACTORS</b>\n{reasons}\n{advisory}\n\
             \u{26A0} <i>Automated signal. Verify before trading.</i>",
            emoji = emoji,
            symbol = signal.symbol,
            headline = headline,
            strength = signal.strength * 100.0,
            price = snapshot.price,
            vwap = snapshot.vwap,
            pcr = pcr,
            support = support,
            resistance = resistance,
            trend = snapshot.trend.label(),
            reasons = reasons,
            advisory = advisory,
        )
    }
}

#[async_trait]
impl DispatchSink for TelegramSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), SinkError> {
        self.send_message(&Self::format_alert(signal)).await?;
        info!(symbol = %signal.symbol, action = signal.action.label(), "alert delivered");
        Ok(())
    }

    async fn announce(&self, text: &str) -> Result<(), SinkError> {
        self.send_message(text).await
    }
}

/// Fallback sink used when Telegram is not configured: signals land in
/// the log stream only.
pub struct LogSink;

#[async_trait]
impl DispatchSink for LogSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), SinkError> {
        info!(
            symbol = %signal.symbol,
            action = signal.action.label(),
            strength = signal.strength,
            reasons = ?signal.reasons,
            "signal (log sink)"
        );
        Ok(())
    }

    async fn announce(&self, text: &str) -> Result<(), SinkError> {
        warn!("{}", text);
        Ok(())
    }
}
