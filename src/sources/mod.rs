//! External collaborators: market data, AI advisory, dispatch sinks.

pub mod advisory;
pub mod telegram;
pub mod upstox;

use async_trait::async_trait;

use crate::types::{Instrument, Observation};

pub use advisory::{AdvisoryClient, AdvisoryError, GeminiAdvisor};
pub use telegram::{DispatchSink, LogSink, SinkError, TelegramSink};
pub use upstox::UpstoxClient;

/// Push/poll boundary for market data. The engine only requires the
/// monotonicity handling it already performs; a source may return `None`
/// when nothing new is available.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self, instrument: &Instrument) -> anyhow::Result<Option<Observation>>;
}
