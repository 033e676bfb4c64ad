// ===============================
// src/engine.rs
// ===============================
//
// Event-loop orchestrator. Everything that mutates position or order state
// runs here, on one consumer of one ordered channel; the feed and gateway
// tasks only publish into it. Order placement and cancellation go out
// fire-and-forget on the command channel, and their outcomes come back as
// ExecReports on the same event channel they share with quotes.

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{EngineEvent, Event, ExecReport, ExecStatus, OrderCommand, Quote, Side};
use crate::metrics::{CANCELS, EXECS, FEED_RESETS, ORDERS, QUOTES, QUOTES_DROPPED, SIGNALS, STALE_EVENTS};
use crate::order::{OpenOrder, OrderManager, OrderStatus};
use crate::position::PositionTracker;
use crate::signal::SignalEvaluator;

pub struct Engine {
    symbol: String,
    lot: i64,
    grace: Duration,
    signal: SignalEvaluator,
    position: PositionTracker,
    orders: OrderManager,
    cmd_tx: mpsc::Sender<OrderCommand>,
    rec_tx: Option<mpsc::Sender<Event>>,
    shutting_down: bool,
}

impl Engine {
    pub fn new(
        cfg: &Config,
        cmd_tx: mpsc::Sender<OrderCommand>,
        rec_tx: Option<mpsc::Sender<Event>>,
    ) -> Self {
        Self {
            symbol: cfg.symbol.clone(),
            lot: cfg.lot,
            grace: Duration::from_millis(cfg.shutdown_grace_ms),
            signal: SignalEvaluator::new(cfg.upper_threshold, cfg.lower_threshold, cfg.tick_px),
            position: PositionTracker::new(cfg.max_quantity),
            orders: OrderManager::new(),
            cmd_tx,
            rec_tx,
            shutting_down: false,
        }
    }

    pub fn position(&self) -> &PositionTracker {
        &self.position
    }

    pub fn order(&self) -> Option<&OpenOrder> {
        self.orders.current()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Consumes the serialized event stream until shutdown completes or the
    /// producers hang up. After the first shutdown signal the loop keeps
    /// draining (waiting for the cancel confirmation) up to the grace period;
    /// a second signal or an elapsed grace period force-exits.
    pub async fn run(mut self, mut rx: mpsc::Receiver<EngineEvent>) {
        let mut deadline: Option<Instant> = None;
        loop {
            let ev = match deadline {
                None => match rx.recv().await {
                    Some(ev) => ev,
                    None => break,
                },
                Some(dl) => match timeout_at(dl, rx.recv()).await {
                    Ok(Some(ev)) => ev,
                    Ok(None) => break,
                    Err(_) => {
                        warn!(symbol = %self.symbol, "shutdown grace period elapsed, forcing exit");
                        break;
                    }
                },
            };

            match ev {
                EngineEvent::Quote(q) => self.on_quote(q).await,
                EngineEvent::Exec(er) => self.on_exec(er).await,
                EngineEvent::FeedReset => {
                    FEED_RESETS.inc();
                    info!(symbol = %self.symbol, "feed reset, clearing quote memory");
                    self.signal.reset();
                }
                EngineEvent::Shutdown => {
                    if self.shutting_down {
                        info!("second shutdown signal, exiting now");
                        break;
                    }
                    self.begin_shutdown().await;
                    if !self.orders.outstanding() {
                        break;
                    }
                    deadline = Some(Instant::now() + self.grace);
                }
            }

            if self.shutting_down && !self.orders.outstanding() {
                break;
            }
        }
        info!(
            held = self.position.held(),
            pending = self.position.pending(),
            "engine stopped"
        );
    }

    pub async fn on_quote(&mut self, q: Quote) {
        if let Err(e) = q.validate() {
            QUOTES_DROPPED.inc();
            warn!(symbol = %self.symbol, error = %e, "malformed quote dropped");
            return;
        }
        QUOTES.inc();
        self.record(Event::Quote(q));

        // Previous-quote memory is updated on every quote, even ones we
        // cannot act on; the resulting signal is discarded in those cases.
        let sig = self.signal.on_quote(&q);

        if self.orders.outstanding() {
            if let Some(o) = self.orders.cancel_if_stale(&q) {
                info!(
                    symbol = %self.symbol,
                    client_id = %o.client_id,
                    limit_px = o.limit_px,
                    bid = q.bid_px,
                    ask = q.ask_px,
                    "price left the touch, cancelling"
                );
                CANCELS.inc();
                self.send_cancel(&o).await;
            }
            return;
        }
        if self.shutting_down {
            return;
        }

        let Some(sig) = sig else { return };
        SIGNALS.with_label_values(&[sig.side.as_str()]).inc();

        let qty = self.lot.min(self.position.remaining(sig.side));
        if !self.position.can_open(sig.side, qty) {
            debug!(
                symbol = %self.symbol,
                side = sig.side.as_str(),
                held = self.position.held(),
                pending = self.position.pending(),
                "signal skipped, position cap reached"
            );
            return;
        }

        // Take liquidity on the favorable side: buy at the bid when the bid
        // is heavy, sell at the ask when the ask is heavy.
        let limit_px = match sig.side {
            Side::Buy => q.bid_px,
            Side::Sell => q.ask_px,
        };
        match self.orders.submit(sig.side, qty, limit_px) {
            Ok(o) => {
                self.position.apply_submit(&o.client_id, o.side, o.qty);
                ORDERS.with_label_values(&[o.side.as_str()]).inc();
                info!(
                    symbol = %self.symbol,
                    client_id = %o.client_id,
                    side = o.side.as_str(),
                    qty = o.qty,
                    limit_px = o.limit_px,
                    strength = sig.strength,
                    "submitting order"
                );
                self.record(Event::Order(o.clone()));
                let _ = self
                    .cmd_tx
                    .send(OrderCommand::Place {
                        client_id: o.client_id,
                        symbol: self.symbol.clone(),
                        side: o.side,
                        qty: o.qty,
                        limit_px: o.limit_px,
                    })
                    .await;
            }
            Err(e) => warn!(symbol = %self.symbol, error = %e, "submit refused"),
        }
    }

    pub async fn on_exec(&mut self, er: ExecReport) {
        EXECS.with_label_values(&[er.status.label()]).inc();
        self.record(Event::Exec(er.clone()));

        let outcome = match &er.status {
            ExecStatus::Ack => self.orders.on_ack(&er.client_id, er.broker_id.clone()),
            ExecStatus::PartialFill | ExecStatus::Filled => {
                let o = self.orders.on_fill(&er.client_id, er.filled_qty, er.remaining_qty);
                if let Some(o) = &o {
                    self.position.apply_fill(&o.client_id, o.side, o.filled_qty);
                    if o.status == OrderStatus::Filled {
                        self.position.close(&o.client_id, o.side, o.qty);
                        info!(
                            symbol = %self.symbol,
                            client_id = %o.client_id,
                            side = o.side.as_str(),
                            qty = o.filled_qty,
                            held = self.position.held(),
                            "order filled"
                        );
                    }
                }
                o
            }
            ExecStatus::Cancelled => {
                let o = self.orders.on_cancel_confirmed(&er.client_id, er.filled_qty);
                if let Some(o) = &o {
                    // The terminal report is authoritative for the final
                    // fill: move it into held before releasing the rest.
                    self.position.apply_fill(&o.client_id, o.side, o.filled_qty);
                    self.position.close(&o.client_id, o.side, o.qty);
                    info!(
                        symbol = %self.symbol,
                        client_id = %o.client_id,
                        filled = o.filled_qty,
                        "cancel confirmed"
                    );
                }
                o
            }
            ExecStatus::Rejected(reason) => {
                let o = self.orders.on_reject(&er.client_id, er.filled_qty);
                if let Some(o) = &o {
                    // Roll exposure back to pre-submission and keep trading.
                    self.position.apply_fill(&o.client_id, o.side, o.filled_qty);
                    self.position.close(&o.client_id, o.side, o.qty);
                    warn!(
                        symbol = %self.symbol,
                        client_id = %o.client_id,
                        reason = %reason,
                        "order rejected by broker"
                    );
                }
                o
            }
        };

        if outcome.is_none() {
            STALE_EVENTS.inc();
            debug!(
                symbol = %self.symbol,
                client_id = %er.client_id,
                status = er.status.label(),
                "report for unknown or stale order, ignored"
            );
        }
    }

    async fn begin_shutdown(&mut self) {
        self.shutting_down = true;
        info!(symbol = %self.symbol, "shutdown requested");
        if let Some(o) = self.orders.request_cancel() {
            info!(client_id = %o.client_id, "cancelling outstanding order before exit");
            CANCELS.inc();
            self.send_cancel(&o).await;
        }
    }

    async fn send_cancel(&self, o: &OpenOrder) {
        let _ = self
            .cmd_tx
            .send(OrderCommand::Cancel {
                client_id: o.client_id.clone(),
                symbol: self.symbol.clone(),
                broker_id: o.broker_id.clone(),
            })
            .await;
    }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(ev);
        }
    }
}
