//! Instrument definitions for the tracked index derivatives.

use serde::{Deserialize, Serialize};

/// A tradeable index with an option chain.
///
/// Loaded once at startup and immutable for the lifetime of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    /// Short name used as the engine-wide key (e.g. "NIFTY").
    pub name: String,
    /// Human-readable name (e.g. "NIFTY 50").
    pub display_name: String,
    /// Provider instrument key for spot quotes (e.g. "NSE_INDEX|Nifty 50").
    pub quote_key: String,
    /// Option symbol prefix used when resolving the chain.
    pub option_prefix: String,
    /// Gap between adjacent strikes.
    pub strike_step: u32,
    /// Contract lot size.
    pub lot_size: u32,
    /// Whether the engine processes this instrument.
    pub enabled: bool,
}

impl Instrument {
    /// Round a spot price to the nearest listed strike.
    pub fn atm_strike(&self, spot: f64) -> u32 {
        let step = self.strike_step as f64;
        ((spot / step).round() * step) as u32
    }
}

/// Built-in registry of supported indices.
///
/// FINNIFTY and MIDCPNIFTY ship disabled; the enabled set is narrowed
/// further by the `INSTRUMENTS` config variable.
pub fn builtin_instruments() -> Vec<Instrument> {
    vec![
        Instrument {
            name: "NIFTY".into(),
            display_name: "NIFTY 50".into(),
            quote_key: "NSE_INDEX|Nifty 50".into(),
            option_prefix: "NIFTY".into(),
            strike_step: 50,
            lot_size: 75,
            enabled: true,
        },
        Instrument {
            name: "BANKNIFTY".into(),
            display_name: "Bank NIFTY".into(),
            quote_key: "NSE_INDEX|Nifty Bank".into(),
            option_prefix: "BANKNIFTY".into(),
            strike_step: 100,
            lot_size: 30,
            enabled: true,
        },
        Instrument {
            name: "SENSEX".into(),
            display_name: "BSE SENSEX".into(),
            quote_key: "BSE_INDEX|SENSEX".into(),
            option_prefix: "SENSEX".into(),
            strike_step: 100,
            lot_size: 10,
            enabled: true,
        },
        Instrument {
            name: "FINNIFTY".into(),
            display_name: "Fin NIFTY".into(),
            quote_key: "NSE_INDEX|Nifty Fin Service".into(),
            option_prefix: "FINNIFTY".into(),
            strike_step: 50,
            lot_size: 40,
            enabled: false,
        },
        Instrument {
            name: "MIDCPNIFTY".into(),
            display_name: "Midcap NIFTY".into(),
            quote_key: "NSE_INDEX|NIFTY MID SELECT".into(),
            option_prefix: "MIDCPNIFTY".into(),
            strike_step: 25,
            lot_size: 75,
            enabled: false,
        },
    ]
}
