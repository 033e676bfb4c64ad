// ===============================
// src/gateway_alpaca.rs
// ===============================
//
// Real order-submission sink: Alpaca REST for place/cancel, trade_updates
// websocket for order lifecycle events. Both directions are fire-and-forget
// from the engine's point of view; everything the broker decides comes back
// as ExecReports on the shared event channel.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use url::Url;

use crate::alpaca::{map_trade_update, order_body, StreamEnvelope};
use crate::domain::{EngineEvent, ExecReport, ExecStatus, OrderCommand, Side};

fn now_ns() -> i128 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}

pub async fn run_alpaca(
    mut rx: mpsc::Receiver<OrderCommand>,
    evt_tx: mpsc::Sender<EngineEvent>,
    rest_base: String,
    ws_base: String,
) {
    let key_id = std::env::var("APCA_API_KEY_ID").expect("APCA_API_KEY_ID missing");
    let secret_key = std::env::var("APCA_API_SECRET_KEY").expect("APCA_API_SECRET_KEY missing");

    let http = reqwest::Client::new();

    // trade_updates stream feeds exec reports back to the engine
    tokio::spawn(trade_updates_loop(
        ws_base,
        key_id.clone(),
        secret_key.clone(),
        evt_tx.clone(),
    ));

    while let Some(cmd) = rx.recv().await {
        match cmd {
            OrderCommand::Place {
                client_id,
                symbol,
                side,
                qty,
                limit_px,
            } => {
                let side_str = match side {
                    Side::Buy => "buy",
                    Side::Sell => "sell",
                };
                let body = order_body(&symbol, side_str, qty, limit_px, &client_id);
                let url = format!("{}/v2/orders", rest_base.trim_end_matches('/'));
                let resp = http
                    .post(url)
                    .header("APCA-API-KEY-ID", &key_id)
                    .header("APCA-API-SECRET-KEY", &secret_key)
                    .json(&body)
                    .send()
                    .await;

                match resp {
                    Ok(rsp) if rsp.status().is_success() => {
                        info!(%client_id, %symbol, "order sent");
                        // ack and fills arrive via trade_updates
                    }
                    Ok(rsp) => {
                        let code = rsp.status();
                        let text = rsp.text().await.unwrap_or_default();
                        error!(%code, %text, %client_id, "order submit failed");
                        let _ = evt_tx
                            .send(EngineEvent::Exec(reject(&client_id, &symbol, text)))
                            .await;
                    }
                    Err(e) => {
                        error!(?e, %client_id, "order submit error");
                        let _ = evt_tx
                            .send(EngineEvent::Exec(reject(&client_id, &symbol, e.to_string())))
                            .await;
                    }
                }
            }
            OrderCommand::Cancel {
                client_id,
                broker_id,
                ..
            } => {
                let Some(id) = broker_id else {
                    // Not acknowledged yet; nothing to cancel broker-side.
                    warn!(%client_id, "cancel requested before ack, skipping");
                    continue;
                };
                let url = format!("{}/v2/orders/{}", rest_base.trim_end_matches('/'), id);
                match http
                    .delete(url)
                    .header("APCA-API-KEY-ID", &key_id)
                    .header("APCA-API-SECRET-KEY", &secret_key)
                    .send()
                    .await
                {
                    Ok(rsp) if rsp.status().is_success() => {
                        info!(%client_id, broker_id = %id, "cancel sent");
                    }
                    Ok(rsp) => {
                        // Best effort: the order may already be filled; the
                        // authoritative outcome arrives on trade_updates.
                        warn!(code = %rsp.status(), %client_id, "cancel not accepted");
                    }
                    Err(e) => error!(?e, %client_id, "cancel request error"),
                }
            }
        }
    }
}

fn reject(client_id: &str, symbol: &str, reason: String) -> ExecReport {
    ExecReport {
        client_id: client_id.to_string(),
        broker_id: None,
        symbol: symbol.to_string(),
        status: ExecStatus::Rejected(reason),
        filled_qty: 0,
        remaining_qty: 0,
        ts_ns: now_ns(),
    }
}

async fn trade_updates_loop(
    ws_base: String,
    key_id: String,
    secret_key: String,
    evt_tx: mpsc::Sender<EngineEvent>,
) {
    loop {
        let url = match Url::parse(&ws_base) {
            Ok(u) => u,
            Err(e) => {
                error!(?e, %ws_base, "bad trading ws url");
                return;
            }
        };

        info!(%ws_base, "connecting trade_updates stream");
        match connect_async(url).await {
            Ok((mut ws, _)) => {
                let auth = serde_json::json!({
                    "action": "authenticate",
                    "data": { "key_id": key_id, "secret_key": secret_key },
                });
                let listen = serde_json::json!({
                    "action": "listen",
                    "data": { "streams": ["trade_updates"] },
                });
                if ws.send(Message::Text(auth.to_string())).await.is_err()
                    || ws.send(Message::Text(listen.to_string())).await.is_err()
                {
                    warn!("trade_updates authenticate/listen failed");
                } else {
                    while let Some(msg) = ws.next().await {
                        match msg {
                            Ok(m) if m.is_text() => {
                                let txt = m.into_text().unwrap_or_default();
                                let Ok(env) = serde_json::from_str::<StreamEnvelope>(&txt) else {
                                    continue;
                                };
                                if env.stream.as_deref() != Some("trade_updates") {
                                    continue;
                                }
                                if let Some(er) = env.data.as_ref().and_then(map_trade_update) {
                                    if evt_tx.send(EngineEvent::Exec(er)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!(?e, "trade_updates ws error");
                                break;
                            }
                        }
                    }
                    warn!("trade_updates disconnected, reconnecting");
                }
            }
            Err(e) => {
                error!(?e, "connect trade_updates failed");
            }
        }
        sleep(Duration::from_secs(2)).await;
    }
}
