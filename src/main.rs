use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use banshee::config::Config;
use banshee::services::{IstSessionClock, SessionClock, SignalEngine};
use banshee::sources::{
    AdvisoryClient, DispatchSink, GeminiAdvisor, LogSink, ObservationSource, TelegramSink,
    UpstoxClient,
};
use banshee::{resolve_instruments, AppState};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banshee=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting Banshee server on {}:{}", config.host, config.port);

    let instruments = Arc::new(resolve_instruments(&config));
    if instruments.is_empty() {
        anyhow::bail!("no instruments enabled; check the INSTRUMENTS variable");
    }
    info!(
        "Tracking instruments: {}",
        instruments
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // Market session clock (NSE/BSE hours, IST)
    let clock: Arc<dyn SessionClock> = Arc::new(IstSessionClock::new());

    // AI advisory client (optional)
    let advisory: Option<Arc<dyn AdvisoryClient>> = match config.gemini_api_key.clone() {
        Some(api_key) => {
            info!("Gemini API key found, advisory layer enabled");
            Some(Arc::new(GeminiAdvisor::new(
                api_key,
                config.gemini_model.clone(),
                Duration::from_secs(config.ai_timeout_secs),
            )))
        }
        None => {
            warn!("No Gemini API key, running rule-only");
            None
        }
    };

    // Dispatch sinks
    let mut sinks: Vec<Arc<dyn DispatchSink>> = Vec::new();
    match (
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
    ) {
        (Some(token), Some(chat_id)) => {
            info!("Telegram sink enabled");
            sinks.push(Arc::new(TelegramSink::new(token, chat_id)));
        }
        _ => {
            warn!("Telegram not configured, alerts go to the log only");
            sinks.push(Arc::new(LogSink));
        }
    }

    // The engine
    let engine = SignalEngine::new(&config, clock.clone(), advisory, sinks.clone());

    // Market data source
    let source: Option<Arc<dyn ObservationSource>> = config
        .upstox_access_token
        .clone()
        .map(|token| Arc::new(UpstoxClient::new(token)) as Arc<dyn ObservationSource>);
    if source.is_none() {
        warn!("UPSTOX_ACCESS_TOKEN not set; no observations will be ingested");
    }

    // Startup notice
    let notice = format!(
        "\u{1F680} <b>Banshee signal engine started</b>\n\nInstruments: {}\nAI advisory: {}\nInterval: {}s",
        instruments
            .iter()
            .map(|i| i.display_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        if config.gemini_api_key.is_some() { "enabled" } else { "disabled" },
        config.refresh_interval_secs,
    );
    for sink in &sinks {
        if let Err(e) = sink.announce(&notice).await {
            warn!(error = %e, "startup notice failed");
        }
    }

    // Polling loop: one pass over all instruments per interval, gated to
    // market hours.
    if let Some(source) = source {
        let engine = engine.clone();
        let clock = clock.clone();
        let instruments = instruments.clone();
        let interval_secs = config.refresh_interval_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;

                if !clock.is_open(chrono::Utc::now()) {
                    continue;
                }

                for instrument in instruments.iter() {
                    match source.fetch(instrument).await {
                        Ok(Some(observation)) => {
                            let outcome = engine.ingest(observation).await;
                            tracing::debug!(
                                instrument = %instrument.name,
                                ?outcome,
                                "cycle complete"
                            );
                        }
                        Ok(None) => {
                            tracing::debug!(instrument = %instrument.name, "no new data");
                        }
                        Err(e) => {
                            error!(instrument = %instrument.name, error = %e, "fetch failed");
                        }
                    }
                }
            }
        });
    }

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let state = AppState {
        config: config.clone(),
        engine: engine.clone(),
        instruments: instruments.clone(),
    };
    let app = Router::new()
        .merge(banshee::api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Banshee server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sinks, engine))
        .await?;

    Ok(())
}

/// Wait for ctrl-c, then send the shutdown notice with a usage summary.
async fn shutdown_signal(sinks: Vec<Arc<dyn DispatchSink>>, engine: Arc<SignalEngine>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    let usage = engine.usage();
    info!(?usage, "shutting down");
    let notice = format!(
        "\u{1F6D1} <b>Banshee stopped</b>\n\nSignals today: {}\nAlerts sent: {}\nAdvisory calls: {} ({} failed)",
        usage.signals_generated, usage.alerts_sent, usage.advisory_calls, usage.advisory_failures,
    );
    for sink in &sinks {
        if let Err(e) = sink.announce(&notice).await {
            warn!(error = %e, "shutdown notice failed");
        }
    }
}
