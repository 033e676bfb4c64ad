// ===============================
// src/config.rs
// ===============================
//
// Env-driven configuration, validated once at startup. The engine itself only
// ever sees the immutable Config struct.
//
// Quick reference:
//   SYMBOL=SNAP                       instrument to trade
//   MAX_QUANTITY=500                  position cap in shares (>= 100)
//   LOT=100                           per-order quantity
//   IMBALANCE_UPPER=0.64              buy when r strictly above
//   IMBALANCE_LOWER=0.36              sell when r strictly below
//   TICK_PX=1                         one tick in cents
//   FEED_MODE=mock|alpaca_paper|alpaca_live
//   VENUE_MODE=mock|alpaca_paper|alpaca_live
//   METRICS_PORT=9898
//   RECORD_FILE=/path/to/events.jsonl (optional JSONL journal)
//   SHUTDOWN_GRACE_MS=3000

use std::env;

use dotenvy::dotenv;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketMode {
    Mock,
    AlpacaPaper,
    AlpacaLive,
}

impl MarketMode {
    pub fn from_env(key: &str, default_mode: MarketMode) -> MarketMode {
        match env::var(key).unwrap_or_default().to_ascii_lowercase().as_str() {
            "mock" => MarketMode::Mock,
            "alpaca_paper" => MarketMode::AlpacaPaper,
            "alpaca_live" => MarketMode::AlpacaLive,
            _ => default_mode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketMode::Mock => "mock",
            MarketMode::AlpacaPaper => "alpaca_paper",
            MarketMode::AlpacaLive => "alpaca_live",
        }
    }

    // Endpoint defaults per mode
    pub fn default_data_ws_url(&self) -> &'static str {
        match self {
            // not used when mocked
            MarketMode::Mock | MarketMode::AlpacaPaper => "wss://stream.data.alpaca.markets/v2/iex",
            MarketMode::AlpacaLive => "wss://stream.data.alpaca.markets/v2/sip",
        }
    }

    pub fn default_trading_rest_url(&self) -> &'static str {
        match self {
            MarketMode::Mock | MarketMode::AlpacaPaper => "https://paper-api.alpaca.markets",
            MarketMode::AlpacaLive => "https://api.alpaca.markets",
        }
    }

    pub fn default_trading_ws_url(&self) -> &'static str {
        match self {
            MarketMode::Mock | MarketMode::AlpacaPaper => "wss://paper-api.alpaca.markets/stream",
            MarketMode::AlpacaLive => "wss://api.alpaca.markets/stream",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub symbol: String,
    /// Position cap: |held + pending| never exceeds this.
    pub max_quantity: i64,
    /// Per-order quantity (capped by remaining room at submit time).
    pub lot: i64,
    pub upper_threshold: f64,
    pub lower_threshold: f64,
    /// One tick in scaled price units (cents).
    pub tick_px: i64,

    pub feed_mode: MarketMode,
    pub venue_mode: MarketMode,
    pub data_ws_url: String,
    pub trading_rest_url: String,
    pub trading_ws_url: String,

    pub metrics_port: u16,
    pub record_file: Option<String>,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SYMBOL must not be empty")]
    EmptySymbol,
    #[error("MAX_QUANTITY must be >= 100, got {0}")]
    MaxQuantityTooSmall(i64),
    #[error("LOT must be in 1..=MAX_QUANTITY, got {0}")]
    BadLot(i64),
    #[error("imbalance thresholds must satisfy 0 < lower < upper < 1, got lower={lower} upper={upper}")]
    BadThresholds { lower: String, upper: String },
    #[error("TICK_PX must be >= 1, got {0}")]
    BadTick(i64),
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenv();

    let symbol = env::var("SYMBOL")
        .unwrap_or_else(|_| "SNAP".to_string())
        .trim()
        .to_ascii_uppercase();

    let max_quantity: i64 = env_parse("MAX_QUANTITY", 500);
    let lot: i64 = env_parse("LOT", 100);
    let upper_threshold: f64 = env_parse("IMBALANCE_UPPER", 0.64);
    let lower_threshold: f64 = env_parse("IMBALANCE_LOWER", 0.36);
    let tick_px: i64 = env_parse("TICK_PX", 1);

    let feed_mode = MarketMode::from_env("FEED_MODE", MarketMode::Mock);
    let venue_mode = MarketMode::from_env("VENUE_MODE", MarketMode::Mock);

    let data_ws_url = env::var("ALPACA_DATA_WS_URL")
        .unwrap_or_else(|_| feed_mode.default_data_ws_url().to_string());
    let trading_rest_url = env::var("ALPACA_REST_URL")
        .unwrap_or_else(|_| venue_mode.default_trading_rest_url().to_string());
    let trading_ws_url = env::var("ALPACA_TRADING_WS_URL")
        .unwrap_or_else(|_| venue_mode.default_trading_ws_url().to_string());

    let metrics_port: u16 = env_parse("METRICS_PORT", 9898);
    let record_file = env::var("RECORD_FILE").ok();
    let shutdown_grace_ms: u64 = env_parse("SHUTDOWN_GRACE_MS", 3000);

    let cfg = Config {
        symbol,
        max_quantity,
        lot,
        upper_threshold,
        lower_threshold,
        tick_px,
        feed_mode,
        venue_mode,
        data_ws_url,
        trading_rest_url,
        trading_ws_url,
        metrics_port,
        record_file,
        shutdown_grace_ms,
    };
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if self.max_quantity < 100 {
            return Err(ConfigError::MaxQuantityTooSmall(self.max_quantity));
        }
        if self.lot < 1 || self.lot > self.max_quantity {
            return Err(ConfigError::BadLot(self.lot));
        }
        let (lo, up) = (self.lower_threshold, self.upper_threshold);
        if !(lo > 0.0 && up < 1.0 && lo < up) {
            return Err(ConfigError::BadThresholds {
                lower: lo.to_string(),
                upper: up.to_string(),
            });
        }
        if self.tick_px < 1 {
            return Err(ConfigError::BadTick(self.tick_px));
        }
        Ok(())
    }
}
