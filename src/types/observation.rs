//! Market observations consumed by the indicator store.

use serde::{Deserialize, Serialize};

/// Option data for a single strike of the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeEntry {
    pub strike: u32,
    pub call_oi: u64,
    pub put_oi: u64,
    pub call_volume: u64,
    pub put_volume: u64,
    pub call_ltp: f64,
    pub put_ltp: f64,
    /// Call implied volatility, when the provider supplies greeks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_iv: Option<f64>,
    /// Put implied volatility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_iv: Option<f64>,
}

/// A full option-chain snapshot for one expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    /// Expiry in YYYY-MM-DD form.
    pub expiry: String,
    pub strikes: Vec<StrikeEntry>,
}

impl ChainSnapshot {
    /// Total open interest across the chain, (calls, puts).
    pub fn total_oi(&self) -> (u64, u64) {
        self.strikes.iter().fold((0, 0), |(c, p), s| {
            (c + s.call_oi, p + s.put_oi)
        })
    }
}

/// A timestamped price/volume sample for one instrument, optionally
/// carrying a fresh option-chain snapshot.
///
/// Timestamps must be non-decreasing per instrument; the indicator store
/// silently drops anything at or before the last accepted timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Instrument name this sample belongs to.
    pub symbol: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    /// Last traded / index price.
    pub price: f64,
    /// Volume traded in this sample interval.
    pub volume: f64,
    /// Option chain snapshot, when one was fetched this cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainSnapshot>,
}

impl Observation {
    /// A bare price/volume sample with no chain data.
    pub fn sample(symbol: &str, timestamp: i64, price: f64, volume: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp,
            price,
            volume,
            chain: None,
        }
    }

    pub fn with_chain(mut self, chain: ChainSnapshot) -> Self {
        self.chain = Some(chain);
        self
    }
}
