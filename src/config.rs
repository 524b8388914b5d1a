use std::env;

/// Indicator window tuning.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Trailing time span of the observation window, in seconds.
    /// Eviction is by time, not count, so irregular tick spacing stays
    /// correct.
    pub span_secs: i64,
    /// Minimum observations before a snapshot is produced (cold start).
    pub min_bars: usize,
    /// Bars on each side a point must dominate to count as a local
    /// extremum.
    pub level_lookback: usize,
    /// Band (percent of price) within which two levels are the same level.
    pub level_epsilon_pct: f64,
    /// Distinct levels retained per side of price.
    pub max_levels: usize,
    /// Bars back used for the trend comparison.
    pub trend_lookback: usize,
    /// Price change (percent) beyond which the trend is Up/Down.
    pub trend_threshold_pct: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            span_secs: 4 * 3600,
            min_bars: 20,
            level_lookback: 3,
            level_epsilon_pct: 0.1,
            max_levels: 3,
            trend_lookback: 10,
            trend_threshold_pct: 0.1,
        }
    }
}

/// Strategy evaluation thresholds.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// PCR below this reads bullish.
    pub pcr_bullish: f64,
    /// PCR above this reads bearish.
    pub pcr_bearish: f64,
    /// Percent deviation from VWAP before the momentum factor fires.
    pub vwap_deviation_pct: f64,
    /// Absolute rule score required for a Buy/Sell entry.
    pub entry_threshold: f64,
    /// Hold signals weaker than this are not emitted at all. Defaults
    /// to the entry threshold, so holds stay silent unless explicitly
    /// lowered.
    pub noise_floor: f64,
    /// Advisory confidence below this is ignored.
    pub ai_confidence_floor: f64,
    /// How much a fully-confident advisory opinion may add to strength.
    pub ai_weight: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            pcr_bullish: 0.7,
            pcr_bearish: 1.3,
            vwap_deviation_pct: 0.5,
            entry_threshold: 0.45,
            noise_floor: 0.45,
            ai_confidence_floor: 0.55,
            ai_weight: 0.35,
        }
    }
}

/// Alert gating and shared budgets.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Seconds a fingerprint stays in Cooling after a dispatch.
    pub cooldown_secs: i64,
    /// System-wide dispatch ceiling per minute; excess is dropped.
    pub max_dispatch_per_min: u32,
    /// Advisory calls allowed per day before degrading to rule-only.
    pub ai_daily_budget: u32,
    /// Include a rounded strength bucket in the dedup fingerprint.
    pub fingerprint_strength_bucket: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 600,
            max_dispatch_per_min: 6,
            ai_daily_budget: 1500,
            fingerprint_strength_bucket: false,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Upstox API access token.
    pub upstox_access_token: Option<String>,
    /// Gemini API key; advisory layer is disabled without one.
    pub gemini_api_key: Option<String>,
    /// Gemini model name.
    pub gemini_model: String,
    /// Telegram bot token.
    pub telegram_bot_token: Option<String>,
    /// Telegram chat to alert.
    pub telegram_chat_id: Option<String>,
    /// Seconds between polling cycles.
    pub refresh_interval_secs: u64,
    /// Advisory request timeout in seconds.
    pub ai_timeout_secs: u64,
    /// Instrument names to run, uppercase (e.g. "NIFTY,BANKNIFTY").
    /// Empty means every registry default.
    pub instruments: Vec<String>,
    pub window: WindowConfig,
    pub strategy: StrategyConfig,
    pub alerts: AlertConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let instruments = env::var("INSTRUMENTS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_uppercase())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let window = WindowConfig {
            span_secs: env_parse("WINDOW_SPAN_SECS", WindowConfig::default().span_secs),
            min_bars: env_parse("WINDOW_MIN_BARS", WindowConfig::default().min_bars),
            level_lookback: env_parse("LEVEL_LOOKBACK", WindowConfig::default().level_lookback),
            level_epsilon_pct: env_parse("LEVEL_EPSILON_PCT", WindowConfig::default().level_epsilon_pct),
            max_levels: env_parse("MAX_LEVELS", WindowConfig::default().max_levels),
            trend_lookback: env_parse("TREND_LOOKBACK", WindowConfig::default().trend_lookback),
            trend_threshold_pct: env_parse("TREND_THRESHOLD_PCT", WindowConfig::default().trend_threshold_pct),
        };

        let strategy = StrategyConfig {
            pcr_bullish: env_parse("PCR_BULLISH", StrategyConfig::default().pcr_bullish),
            pcr_bearish: env_parse("PCR_BEARISH", StrategyConfig::default().pcr_bearish),
            vwap_deviation_pct: env_parse("VWAP_DEVIATION_PCT", StrategyConfig::default().vwap_deviation_pct),
            entry_threshold: env_parse("ENTRY_THRESHOLD", StrategyConfig::default().entry_threshold),
            noise_floor: env_parse("NOISE_FLOOR", StrategyConfig::default().noise_floor),
            ai_confidence_floor: env_parse("AI_CONFIDENCE_FLOOR", StrategyConfig::default().ai_confidence_floor),
            ai_weight: env_parse("AI_WEIGHT", StrategyConfig::default().ai_weight),
        };

        let alerts = AlertConfig {
            cooldown_secs: env_parse("ALERT_COOLDOWN_SECS", AlertConfig::default().cooldown_secs),
            max_dispatch_per_min: env_parse("MAX_DISPATCH_PER_MIN", AlertConfig::default().max_dispatch_per_min),
            ai_daily_budget: env_parse("AI_DAILY_BUDGET", AlertConfig::default().ai_daily_budget),
            fingerprint_strength_bucket: env::var("FINGERPRINT_STRENGTH_BUCKET")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 8080),
            upstox_access_token: env::var("UPSTOX_ACCESS_TOKEN").ok(),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
            refresh_interval_secs: env_parse("REFRESH_INTERVAL_SECS", 60),
            ai_timeout_secs: env_parse("AI_TIMEOUT_SECS", 10),
            instruments,
            window,
            strategy,
            alerts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            upstox_access_token: None,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            refresh_interval_secs: 60,
            ai_timeout_secs: 10,
            instruments: Vec::new(),
            window: WindowConfig::default(),
            strategy: StrategyConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}
