// ===============================
// src/feed.rs
// ===============================
//
// Market data adapters:
// - run_mock   : random-walk quote generator (~200 quotes/s), one-tick spread
//                most of the time so the strategy has something to chew on
// - run_alpaca : Alpaca data stream v2 websocket, `q.<symbol>` quote channel;
//                reconnect with exponential backoff + resubscribe is owned
//                here, and every (re)connect publishes a FeedReset so the
//                engine drops its previous-quote memory
//
// Price scale: integer cents (tick = 1), same domain as the rest of the crate.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use url::Url;

use crate::domain::{EngineEvent, Quote};

fn now_ns() -> i128 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}

/// Mock quote generator: bid random-walks, the ask usually sits one tick
/// above it, and sizes skew randomly so imbalance signals do fire.
pub async fn run_mock(evt_tx: mpsc::Sender<EngineEvent>, symbol: String) {
    info!(%symbol, "mock feed started");
    let mut bid_px: i64 = 10_00;
    loop {
        let (step, spread, bid_size, ask_size) = {
            // keep ThreadRng out of the await below
            let mut rng = rand::thread_rng();
            let step = rng.gen_range(-2..=2);
            let spread = if rng.gen_ratio(4, 5) { 1 } else { 2 };
            (step, spread, rng.gen_range(1..=1_000), rng.gen_range(1..=1_000))
        };
        bid_px = (bid_px + step).max(1_00);
        let q = Quote {
            bid_px,
            bid_size,
            ask_px: bid_px + spread,
            ask_size,
            ts_ns: now_ns(),
        };
        if evt_tx.send(EngineEvent::Quote(q)).await.is_err() {
            return; // engine gone
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// Alpaca data stream v2 adapter for one symbol's quotes.
pub async fn run_alpaca(
    evt_tx: mpsc::Sender<EngineEvent>,
    symbol: String,
    ws_url: String,
    key_id: String,
    secret_key: String,
) {
    let mut attempt: u32 = 0;
    loop {
        let url = match Url::parse(&ws_url) {
            Ok(u) => u,
            Err(e) => {
                error!(?e, %ws_url, "bad data ws url");
                return;
            }
        };

        info!(%ws_url, %symbol, "connecting alpaca data stream");
        match connect_async(url).await {
            Ok((mut ws, _resp)) => {
                attempt = 0; // reset backoff

                let auth = serde_json::json!({
                    "action": "auth", "key": key_id, "secret": secret_key,
                });
                let sub = serde_json::json!({
                    "action": "subscribe", "quotes": [symbol],
                });
                if ws.send(Message::Text(auth.to_string())).await.is_err()
                    || ws.send(Message::Text(sub.to_string())).await.is_err()
                {
                    warn!("failed to authenticate/subscribe, reconnecting");
                } else {
                    info!(%symbol, "subscribed to quotes");
                    // Anything buffered before the gap is no longer the book.
                    if evt_tx.send(EngineEvent::FeedReset).await.is_err() {
                        return;
                    }

                    while let Some(frame) = ws.next().await {
                        match frame {
                            Ok(m) if m.is_text() => {
                                let txt = match m.into_text() {
                                    Ok(t) => t,
                                    Err(e) => {
                                        warn!(?e, "failed to read text frame");
                                        continue;
                                    }
                                };
                                for q in parse_quotes(&txt, &symbol) {
                                    if evt_tx.send(EngineEvent::Quote(q)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Ok(_) => {
                                // ignore non-text frames
                            }
                            Err(e) => {
                                error!(?e, "data ws read error");
                                break;
                            }
                        }
                    }
                    info!("data stream disconnected, will reconnect");
                }
            }
            Err(e) => {
                error!(?e, "data stream connect failed");
            }
        }

        // Exponential backoff + jitter
        attempt = attempt.saturating_add(1);
        let shift = attempt.min(6);
        let factor = 1u64 << shift; // 2,4,...,64
        let base_ms = 500u64.saturating_mul(factor);
        let jitter = rand::thread_rng().gen_range(0..=250);
        sleep(Duration::from_millis(base_ms + jitter)).await;
    }
}

/// Parses an Alpaca v2 message batch and extracts quote updates for `symbol`.
///
/// Example payload:
/// `[{"T":"q","S":"SNAP","bp":10.00,"bs":9,"ap":10.01,"as":1,"t":"..."}]`
/// A batch can interleave other subscribed symbols; anything not ours is
/// skipped. Sizes arrive in round lots; we scale to shares.
fn parse_quotes(txt: &str, symbol: &str) -> Vec<Quote> {
    let Ok(batch) = serde_json::from_str::<Vec<serde_json::Value>>(txt) else {
        return Vec::new();
    };
    batch
        .iter()
        .filter(|v| v.get("T").and_then(|t| t.as_str()) == Some("q"))
        .filter(|v| v.get("S").and_then(|s| s.as_str()) == Some(symbol))
        .filter_map(|v| {
            let bp = v.get("bp")?.as_f64()?;
            let ap = v.get("ap")?.as_f64()?;
            let bs = v.get("bs")?.as_i64()?;
            let asz = v.get("as")?.as_i64()?;
            Some(Quote {
                bid_px: (bp * 100.0).round() as i64,
                ask_px: (ap * 100.0).round() as i64,
                bid_size: bs * 100,
                ask_size: asz * 100,
                ts_ns: now_ns(),
            })
        })
        .collect()
}
