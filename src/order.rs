// ===============================
// src/order.rs
// ===============================
//
// Single-order lifecycle state machine. The strategy holds at most one live
// order; a second submit while one is outstanding is refused. Transitions are
// event-driven: the broker's reports are authoritative, and a report for an
// order we no longer track (late cancel ack, replayed fill) is ignored by the
// caller after a debug log.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Quote, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub client_id: String,
    /// Broker-assigned id; absent until the order is acknowledged.
    pub broker_id: Option<String>,
    pub side: Side,
    pub qty: i64,
    pub limit_px: i64,
    pub status: OrderStatus,
    /// Cumulative filled quantity reported so far.
    pub filled_qty: i64,
    pub cancel_requested: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("order {0} already outstanding")]
    AlreadyOutstanding(String),
}

#[derive(Default)]
pub struct OrderManager {
    current: Option<OpenOrder>,
}

impl OrderManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outstanding(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&OpenOrder> {
        self.current.as_ref()
    }

    /// Creates a new Pending order. Refused while another order is live.
    pub fn submit(&mut self, side: Side, qty: i64, limit_px: i64) -> Result<OpenOrder, OrderError> {
        if let Some(o) = &self.current {
            return Err(OrderError::AlreadyOutstanding(o.client_id.clone()));
        }
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let client_id = format!("CL-{}-{}", now, rand::thread_rng().gen::<u32>());
        let order = OpenOrder {
            client_id,
            broker_id: None,
            side,
            qty,
            limit_px,
            status: OrderStatus::Pending,
            filled_qty: 0,
            cancel_requested: false,
        };
        self.current = Some(order.clone());
        Ok(order)
    }

    /// Broker acknowledgment: Pending -> Open.
    pub fn on_ack(&mut self, client_id: &str, broker_id: Option<String>) -> Option<OpenOrder> {
        let o = self.tracked_mut(client_id)?;
        if o.broker_id.is_none() {
            o.broker_id = broker_id;
        }
        if o.status == OrderStatus::Pending {
            o.status = OrderStatus::Open;
        }
        Some(o.clone())
    }

    /// Fill report with cumulative filled and remaining quantity. A fully
    /// filled order is terminal and stops being tracked.
    pub fn on_fill(&mut self, client_id: &str, cum_filled: i64, remaining: i64) -> Option<OpenOrder> {
        let o = self.tracked_mut(client_id)?;
        o.filled_qty = cum_filled.max(o.filled_qty);
        o.status = if remaining == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        let snap = o.clone();
        if snap.status.is_terminal() {
            self.current = None;
        }
        Some(snap)
    }

    /// Cancel confirmation. The broker's terminal report is authoritative:
    /// it carries the final cumulative fill, which may exceed what any
    /// earlier PartialFill conveyed (e.g. one missed across a reconnect).
    pub fn on_cancel_confirmed(&mut self, client_id: &str, cum_filled: i64) -> Option<OpenOrder> {
        let o = self.tracked_mut(client_id)?;
        o.filled_qty = cum_filled.max(o.filled_qty);
        o.status = OrderStatus::Cancelled;
        let snap = o.clone();
        self.current = None;
        Some(snap)
    }

    pub fn on_reject(&mut self, client_id: &str, cum_filled: i64) -> Option<OpenOrder> {
        let o = self.tracked_mut(client_id)?;
        o.filled_qty = cum_filled.max(o.filled_qty);
        o.status = OrderStatus::Rejected;
        let snap = o.clone();
        self.current = None;
        Some(snap)
    }

    /// If the live order is no longer resting at the touch for its side, mark
    /// it for cancellation and return it. At most one cancel is issued per
    /// order, no matter how many quotes arrive afterwards.
    pub fn cancel_if_stale(&mut self, q: &Quote) -> Option<OpenOrder> {
        let o = self.current.as_mut()?;
        if o.cancel_requested
            || !matches!(o.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
        {
            return None;
        }
        let at_touch = match o.side {
            Side::Buy => q.bid_px == o.limit_px,
            Side::Sell => q.ask_px == o.limit_px,
        };
        if at_touch {
            return None;
        }
        o.cancel_requested = true;
        Some(o.clone())
    }

    /// Marks the live order (any non-terminal state) for cancellation during
    /// shutdown. Returns None if a cancel was already requested.
    pub fn request_cancel(&mut self) -> Option<OpenOrder> {
        let o = self.current.as_mut()?;
        if o.cancel_requested {
            return None;
        }
        o.cancel_requested = true;
        Some(o.clone())
    }

    fn tracked_mut(&mut self, client_id: &str) -> Option<&mut OpenOrder> {
        self.current
            .as_mut()
            .filter(|o| o.client_id == client_id)
    }
}
