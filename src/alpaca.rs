// ===============================
// src/alpaca.rs
// ===============================
//
// Minimal Alpaca wire models: the trade_updates stream envelope and the
// mapping into the engine's ExecReport. Transport lives in gateway_alpaca.

use chrono::Utc;
use serde::Deserialize;

use crate::domain::{ExecReport, ExecStatus};

#[derive(Debug, Deserialize)]
pub struct StreamEnvelope {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub data: Option<TradeUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct TradeUpdate {
    /// new, fill, partial_fill, canceled, rejected, ...
    pub event: String,
    pub order: OrderPayload,
}

#[derive(Debug, Deserialize)]
pub struct OrderPayload {
    pub id: String,
    pub client_order_id: String,
    pub symbol: String,
    #[serde(default)]
    pub qty: Option<String>,
    #[serde(default)]
    pub filled_qty: Option<String>,
}

fn parse_qty(s: &Option<String>) -> i64 {
    s.as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0) as i64
}

/// Maps a trade_updates event onto an ExecReport. Events the engine has no
/// transition for (replaced, pending_cancel, ...) map to None and are simply
/// not forwarded.
pub fn map_trade_update(tu: &TradeUpdate) -> Option<ExecReport> {
    let filled = parse_qty(&tu.order.filled_qty);
    let qty = parse_qty(&tu.order.qty);
    let status = match tu.event.as_str() {
        "new" => ExecStatus::Ack,
        "partial_fill" => ExecStatus::PartialFill,
        "fill" => ExecStatus::Filled,
        "canceled" | "expired" => ExecStatus::Cancelled,
        "rejected" => ExecStatus::Rejected(tu.event.clone()),
        _ => return None,
    };
    Some(ExecReport {
        client_id: tu.order.client_order_id.clone(),
        broker_id: Some(tu.order.id.clone()),
        symbol: tu.order.symbol.clone(),
        status,
        filled_qty: filled,
        remaining_qty: (qty - filled).max(0),
        ts_ns: Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128,
    })
}

/// Body for POST /v2/orders. Prices cross the wire as decimal dollars.
pub fn order_body(
    symbol: &str,
    side_str: &str,
    qty: i64,
    limit_px_cents: i64,
    client_id: &str,
) -> serde_json::Value {
    serde_json::json!({
        "symbol": symbol,
        "qty": qty.to_string(),
        "side": side_str,
        "type": "limit",
        "time_in_force": "day",
        "limit_price": format!("{:.2}", limit_px_cents as f64 / 100.0),
        "client_order_id": client_id,
    })
}
