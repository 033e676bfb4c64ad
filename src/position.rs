// ===============================
// src/position.rs
// ===============================
//
// Inventory tracker. `held` is the filled position (signed, positive = long);
// `pending` is quantity committed to the one in-flight order. The broker
// reports fills cumulatively per order, so a per-order ledger of the last
// seen filled amount turns each report into a delta.
//
// Single writer: only the engine's dispatch loop mutates this state.

use ahash::AHashMap as HashMap;

use crate::domain::Side;
use crate::metrics::{POSITION_HELD, POSITION_PENDING};

pub struct PositionTracker {
    held: i64,
    pending: i64,
    max_qty: i64,
    filled_by_order: HashMap<String, i64>,
}

impl PositionTracker {
    pub fn new(max_qty: i64) -> Self {
        Self {
            held: 0,
            pending: 0,
            max_qty,
            filled_by_order: HashMap::new(),
        }
    }

    pub fn held(&self) -> i64 {
        self.held
    }

    pub fn pending(&self) -> i64 {
        self.pending
    }

    /// Quantity still available in `side`'s direction before the cap.
    pub fn remaining(&self, side: Side) -> i64 {
        let net = self.held + self.pending;
        (self.max_qty - side.sign() * net).max(0)
    }

    /// True iff the directed exposure after opening `qty` on `side` stays
    /// within the configured maximum.
    pub fn can_open(&self, side: Side, qty: i64) -> bool {
        qty > 0 && qty <= self.remaining(side)
    }

    /// Commits `qty` to a newly submitted order.
    pub fn apply_submit(&mut self, client_id: &str, side: Side, qty: i64) {
        self.pending += side.sign() * qty;
        self.filled_by_order.insert(client_id.to_string(), 0);
        self.export();
    }

    /// Applies a (possibly partial) fill report. `cum_filled` is the
    /// cumulative filled quantity the broker reports for this order; only the
    /// delta since the last report moves pending into held. Reports for
    /// unknown orders are ignored.
    pub fn apply_fill(&mut self, client_id: &str, side: Side, cum_filled: i64) {
        let Some(last) = self.filled_by_order.get_mut(client_id) else {
            return;
        };
        let delta = cum_filled - *last;
        if delta <= 0 {
            return;
        }
        *last = cum_filled;
        self.pending -= side.sign() * delta;
        self.held += side.sign() * delta;
        self.export();
    }

    /// Closes out an order's ledger entry when it reaches a terminal state,
    /// releasing whatever part of `order_qty` never filled back from pending.
    pub fn close(&mut self, client_id: &str, side: Side, order_qty: i64) {
        let Some(filled) = self.filled_by_order.remove(client_id) else {
            return;
        };
        let unfilled = order_qty - filled;
        if unfilled > 0 {
            self.pending -= side.sign() * unfilled;
        }
        self.export();
    }

    fn export(&self) {
        POSITION_HELD.set(self.held);
        POSITION_PENDING.set(self.pending);
    }
}
