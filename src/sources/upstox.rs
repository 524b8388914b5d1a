//! Upstox market-data client.
//!
//! Composes the latest intraday candle and the option chain for an
//! instrument into one `Observation` per polling cycle.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::sources::ObservationSource;
use crate::types::{ChainSnapshot, Instrument, Observation, StrikeEntry};

const BASE_URL: &str = "https://api.upstox.com/v2";
const CANDLE_URL: &str = "https://api.upstox.com/v3/historical-candle/intraday";

/// Success envelope every Upstox endpoint uses.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ContractRow {
    expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChainRow {
    strike_price: Option<f64>,
    call_options: Option<OptionSide>,
    put_options: Option<OptionSide>,
}

#[derive(Debug, Deserialize, Default)]
struct OptionSide {
    #[serde(default)]
    market_data: SideMarketData,
    option_greeks: Option<Greeks>,
}

#[derive(Debug, Deserialize, Default)]
struct SideMarketData {
    #[serde(default)]
    ltp: f64,
    #[serde(default)]
    volume: u64,
    #[serde(default)]
    oi: u64,
}

#[derive(Debug, Deserialize)]
struct Greeks {
    iv: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CandlePayload {
    #[serde(default)]
    candles: Vec<serde_json::Value>,
}

/// A parsed `[timestamp, o, h, l, c, volume, oi]` candle row.
#[derive(Debug, Clone, Copy)]
struct Candle {
    timestamp: i64,
    close: f64,
    volume: f64,
}

/// REST client for Upstox market data.
pub struct UpstoxClient {
    client: Client,
    access_token: String,
    /// instrument name -> resolved nearest expiry, cached per process.
    expiry_cache: DashMap<String, NaiveDate>,
}

impl UpstoxClient {
    pub fn new(access_token: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
            expiry_cache: DashMap::new(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> anyhow::Result<T> {
        let response = self
            .client
            .get(url)
            .query(params)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .context("upstox request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("upstox returned {}: {}", status, body));
        }

        let envelope: Envelope<T> = response.json().await.context("upstox response decode")?;
        if envelope.status != "success" {
            return Err(anyhow!("upstox status: {}", envelope.status));
        }
        envelope.data.ok_or_else(|| anyhow!("upstox payload empty"))
    }

    /// Resolve (and cache) the nearest non-past expiry for an instrument.
    pub async fn nearest_expiry(&self, instrument: &Instrument) -> anyhow::Result<NaiveDate> {
        if let Some(cached) = self.expiry_cache.get(&instrument.name) {
            return Ok(*cached);
        }

        let rows: Vec<ContractRow> = self
            .get_json(
                &format!("{}/option/contract", BASE_URL),
                &[("instrument_key", instrument.quote_key.as_str())],
            )
            .await?;

        let today = Utc::now().date_naive();
        let mut expiries: Vec<NaiveDate> = rows
            .iter()
            .filter_map(|r| r.expiry.as_deref())
            .filter_map(|e| NaiveDate::parse_from_str(e, "%Y-%m-%d").ok())
            .collect();
        expiries.sort();
        expiries.dedup();

        let nearest = expiries
            .iter()
            .find(|e| **e >= today)
            .or_else(|| expiries.first())
            .copied()
            .ok_or_else(|| anyhow!("no expiries listed for {}", instrument.name))?;

        debug!(instrument = %instrument.name, %nearest, "resolved nearest expiry");
        self.expiry_cache.insert(instrument.name.clone(), nearest);
        Ok(nearest)
    }

    /// Fetch the option chain for one expiry.
    pub async fn option_chain(
        &self,
        instrument: &Instrument,
        expiry: NaiveDate,
    ) -> anyhow::Result<ChainSnapshot> {
        let expiry_str = expiry.format("%Y-%m-%d").to_string();
        let rows: Vec<ChainRow> = self
            .get_json(
                &format!("{}/option/chain", BASE_URL),
                &[
                    ("instrument_key", instrument.quote_key.as_str()),
                    ("expiry_date", expiry_str.as_str()),
                ],
            )
            .await?;

        let strikes = rows
            .into_iter()
            .filter_map(|row| {
                let strike = row.strike_price? as u32;
                let call = row.call_options.unwrap_or_default();
                let put = row.put_options.unwrap_or_default();
                Some(StrikeEntry {
                    strike,
                    call_oi: call.market_data.oi,
                    put_oi: put.market_data.oi,
                    call_volume: call.market_data.volume,
                    put_volume: put.market_data.volume,
                    call_ltp: call.market_data.ltp,
                    put_ltp: put.market_data.ltp,
                    call_iv: call.option_greeks.and_then(|g| g.iv),
                    put_iv: put.option_greeks.and_then(|g| g.iv),
                })
            })
            .collect();

        Ok(ChainSnapshot {
            expiry: expiry_str,
            strikes,
        })
    }

    /// Latest one-minute intraday candle for the instrument.
    async fn latest_candle(&self, instrument: &Instrument) -> anyhow::Result<Option<Candle>> {
        let encoded_key = instrument.quote_key.replace('|', "%7C").replace(' ', "%20");
        let url = format!("{}/{}/minutes/1", CANDLE_URL, encoded_key);
        let payload: CandlePayload = self.get_json(&url, &[]).await?;

        // Rows arrive newest first: [ts, o, h, l, c, volume, oi].
        Ok(payload.candles.first().and_then(parse_candle))
    }
}

fn parse_candle(row: &serde_json::Value) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < 6 {
        return None;
    }
    let timestamp = fields[0]
        .as_str()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp_millis())?;
    Some(Candle {
        timestamp,
        close: fields[4].as_f64()?,
        volume: fields[5].as_f64().unwrap_or(0.0),
    })
}

#[async_trait]
impl ObservationSource for UpstoxClient {
    async fn fetch(&self, instrument: &Instrument) -> anyhow::Result<Option<Observation>> {
        let candle = match self.latest_candle(instrument).await {
            Ok(candle) => candle,
            Err(e) => {
                warn!(instrument = %instrument.name, error = %e, "candle fetch failed");
                None
            }
        };

        let Some(candle) = candle else {
            return Ok(None);
        };

        let mut observation = Observation::sample(
            &instrument.name,
            candle.timestamp,
            candle.close,
            candle.volume,
        );

        // Chain data enriches the observation but its absence never
        // blocks the price path.
        match self.nearest_expiry(instrument).await {
            Ok(expiry) => match self.option_chain(instrument, expiry).await {
                Ok(chain) if !chain.strikes.is_empty() => {
                    observation = observation.with_chain(chain);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(instrument = %instrument.name, error = %e, "chain fetch failed");
                }
            },
            Err(e) => {
                warn!(instrument = %instrument.name, error = %e, "expiry resolution failed");
            }
        }

        Ok(Some(observation))
    }
}
