// ===============================
// src/gateway.rs (mock venue)
// ===============================
//
// Paper venue for dev/test runs: every Place is acked immediately and fills
// in full after `fill_ms`, unless a Cancel for it lands first. Cancels for
// orders it no longer holds are acknowledged as cancelled anyway — the
// broker-side outcome is authoritative and the engine tolerates late or
// redundant reports.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::info;

use crate::domain::{EngineEvent, ExecReport, ExecStatus, OrderCommand};

struct RestingOrder {
    client_id: String,
    broker_id: String,
    symbol: String,
    qty: i64,
    fill_at: Instant,
}

pub async fn run_mock(
    mut rx: mpsc::Receiver<OrderCommand>,
    evt_tx: mpsc::Sender<EngineEvent>,
    fill_ms: u64,
) {
    info!(fill_ms, "mock gateway started");
    let mut seq: u64 = 0;
    let mut resting: Option<RestingOrder> = None;

    loop {
        // Copy the deadline out so the timer future does not borrow `resting`.
        let fill_at = resting.as_ref().map(|o| o.fill_at);

        tokio::select! {
            cmd = rx.recv() => match cmd {
                None => break,
                Some(OrderCommand::Place { client_id, symbol, qty, .. }) => {
                    seq += 1;
                    let broker_id = format!("SIM-{seq}");
                    let ack = ExecReport {
                        client_id: client_id.clone(),
                        broker_id: Some(broker_id.clone()),
                        symbol: symbol.clone(),
                        status: ExecStatus::Ack,
                        filled_qty: 0,
                        remaining_qty: qty,
                        ts_ns: now_ns(),
                    };
                    if evt_tx.send(EngineEvent::Exec(ack)).await.is_err() {
                        return;
                    }
                    resting = Some(RestingOrder {
                        client_id,
                        broker_id,
                        symbol,
                        qty,
                        fill_at: Instant::now() + Duration::from_millis(fill_ms),
                    });
                }
                Some(OrderCommand::Cancel {
                    client_id, symbol, ..
                }) => {
                    let mut broker_id = None;
                    if resting.as_ref().is_some_and(|o| o.client_id == client_id) {
                        if let Some(o) = resting.take() {
                            broker_id = Some(o.broker_id);
                        }
                    }
                    let cx = ExecReport {
                        client_id,
                        broker_id,
                        symbol,
                        status: ExecStatus::Cancelled,
                        filled_qty: 0,
                        remaining_qty: 0,
                        ts_ns: now_ns(),
                    };
                    if evt_tx.send(EngineEvent::Exec(cx)).await.is_err() {
                        return;
                    }
                }
            },
            _ = async move {
                match fill_at {
                    Some(t) => sleep_until(t).await,
                    None => std::future::pending().await,
                }
            } => {
                if let Some(o) = resting.take() {
                    let fill = ExecReport {
                        client_id: o.client_id,
                        broker_id: Some(o.broker_id),
                        symbol: o.symbol,
                        status: ExecStatus::Filled,
                        filled_qty: o.qty,
                        remaining_qty: 0,
                        ts_ns: now_ns(),
                    };
                    if evt_tx.send(EngineEvent::Exec(fill)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn now_ns() -> i128 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}
