//! Banshee - AI-enhanced intraday options signal engine

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use std::sync::Arc;

use config::Config;
use services::SignalEngine;
use types::Instrument;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<SignalEngine>,
    pub instruments: Arc<Vec<Instrument>>,
}

/// Resolve the instrument set to run: registry defaults narrowed by the
/// configured name list.
pub fn resolve_instruments(config: &Config) -> Vec<Instrument> {
    let registry = types::builtin_instruments();
    if config.instruments.is_empty() {
        registry.into_iter().filter(|i| i.enabled).collect()
    } else {
        registry
            .into_iter()
            .filter(|i| config.instruments.contains(&i.name))
            .collect()
    }
}
