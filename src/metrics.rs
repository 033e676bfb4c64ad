// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static QUOTES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("quotes_total", "quote updates processed").unwrap());

pub static QUOTES_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("quotes_dropped_total", "malformed quotes dropped").unwrap()
});

pub static SIGNALS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("signals_total", "imbalance signals (label: side)"),
        &["side"],
    )
    .unwrap()
});

pub static ORDERS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("orders_total", "orders submitted (label: side)"),
        &["side"],
    )
    .unwrap()
});

pub static CANCELS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("cancels_total", "cancel requests issued").unwrap());

pub static EXECS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("exec_reports_total", "execution reports (label: status)"),
        &["status"],
    )
    .unwrap()
});

pub static STALE_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stale_exec_events_total",
        "exec reports for orders no longer tracked",
    )
    .unwrap()
});

pub static POSITION_HELD: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("position_held_qty", "filled position (signed)").unwrap());

pub static POSITION_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("position_pending_qty", "quantity committed to the in-flight order").unwrap()
});

pub static FEED_RESETS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("feed_resets_total", "market data reconnects").unwrap()
});

// ---- Config visibility ----
pub static CONFIG_SYMBOL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_symbol", "configured symbol (label: symbol)"),
        &["symbol"],
    )
    .unwrap()
});

pub static CONFIG_MAX_QTY: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("config_max_quantity", "configured position cap").unwrap());

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(QUOTES.clone())),
        REGISTRY.register(Box::new(QUOTES_DROPPED.clone())),
        REGISTRY.register(Box::new(SIGNALS.clone())),
        REGISTRY.register(Box::new(ORDERS.clone())),
        REGISTRY.register(Box::new(CANCELS.clone())),
        REGISTRY.register(Box::new(EXECS.clone())),
        REGISTRY.register(Box::new(STALE_EVENTS.clone())),
        REGISTRY.register(Box::new(POSITION_HELD.clone())),
        REGISTRY.register(Box::new(POSITION_PENDING.clone())),
        REGISTRY.register(Box::new(FEED_RESETS.clone())),
        REGISTRY.register(Box::new(CONFIG_SYMBOL.clone())),
        REGISTRY.register(Box::new(CONFIG_MAX_QTY.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = TcpListener::bind(&addr)
            .unwrap_or_else(|e| panic!("metrics bind {} failed: {}", addr, e));
        tracing::info!(%addr, "metrics listening");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(?e, "metrics accept error"),
            }
        }
    });
}
