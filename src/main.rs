// ===============================
// src/main.rs
// ===============================
//
// Wiring only: load config, start metrics, spawn the feed / gateway /
// recorder tasks around two bounded channels, hook ctrl-c to a Shutdown
// event, and hand the event receiver to the engine loop.

use tokio::sync::mpsc;
use tracing::{error, info};

use tick_taker::config::{self, MarketMode};
use tick_taker::domain::{EngineEvent, Event, OrderCommand};
use tick_taker::engine::Engine;
use tick_taker::{feed, gateway, gateway_alpaca, metrics, recorder};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ---- Load & validate config ----
    let cfg = match config::load() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(cfg.metrics_port));
    metrics::CONFIG_SYMBOL
        .with_label_values(&[&cfg.symbol])
        .set(1);
    metrics::CONFIG_MAX_QTY.set(cfg.max_quantity);

    info!(
        symbol = %cfg.symbol,
        max_quantity = cfg.max_quantity,
        lot = cfg.lot,
        upper = cfg.upper_threshold,
        lower = cfg.lower_threshold,
        tick_px = cfg.tick_px,
        feed_mode = cfg.feed_mode.as_str(),
        venue_mode = cfg.venue_mode.as_str(),
        "startup config"
    );

    // ---- Channels: one ordered event stream in, one command stream out ----
    let (evt_tx, evt_rx) = mpsc::channel::<EngineEvent>(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel::<OrderCommand>(256);

    // ---- Recorder (optional) ----
    let rec_tx = cfg.record_file.clone().map(|path| {
        let (tx, rx) = mpsc::channel::<Event>(8192);
        tokio::spawn(recorder::run(rx, path));
        tx
    });

    // ---- Market data feed ----
    match cfg.feed_mode {
        MarketMode::Mock => {
            tokio::spawn(feed::run_mock(evt_tx.clone(), cfg.symbol.clone()));
        }
        MarketMode::AlpacaPaper | MarketMode::AlpacaLive => {
            let key_id = std::env::var("APCA_API_KEY_ID").expect("APCA_API_KEY_ID missing");
            let secret_key =
                std::env::var("APCA_API_SECRET_KEY").expect("APCA_API_SECRET_KEY missing");
            tokio::spawn(feed::run_alpaca(
                evt_tx.clone(),
                cfg.symbol.clone(),
                cfg.data_ws_url.clone(),
                key_id,
                secret_key,
            ));
        }
    }

    // ---- Order gateway ----
    match cfg.venue_mode {
        MarketMode::Mock => {
            tokio::spawn(gateway::run_mock(cmd_rx, evt_tx.clone(), 20));
        }
        MarketMode::AlpacaPaper | MarketMode::AlpacaLive => {
            tokio::spawn(gateway_alpaca::run_alpaca(
                cmd_rx,
                evt_tx.clone(),
                cfg.trading_rest_url.clone(),
                cfg.trading_ws_url.clone(),
            ));
        }
    }

    // ---- Ctrl-C -> Shutdown events (deliverable more than once) ----
    {
        let tx = evt_tx.clone();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if tx.send(EngineEvent::Shutdown).await.is_err() {
                    return;
                }
            }
        });
    }

    // ---- Engine loop (owns all position/order state) ----
    Engine::new(&cfg, cmd_tx, rec_tx).run(evt_rx).await;
}
