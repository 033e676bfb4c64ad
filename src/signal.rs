// ===============================
// src/signal.rs
// ===============================
//
// Order-book-imbalance evaluator for one-cent-spread names.
//
// The strategy only looks at quotes whose spread is exactly one tick; wider
// spreads can mean news or thin books, which this algorithm is not tuned to
// trade. Within a one-tick book, a heavy bid relative to the ask suggests the
// ask is about to lift (buy at the bid), and vice versa for a heavy ask.
//
// A signal only fires on a level change: both bid and ask moved since the
// previous quote. Re-publishing the same level does not re-fire, which keeps
// the strategy from stacking entries on a static book.

use crate::domain::{Quote, Side, Signal};

pub struct SignalEvaluator {
    upper: f64,
    lower: f64,
    tick_px: i64,
    prev: Option<Quote>,
}

impl SignalEvaluator {
    pub fn new(upper: f64, lower: f64, tick_px: i64) -> Self {
        Self {
            upper,
            lower,
            tick_px,
            prev: None,
        }
    }

    /// Clears previous-quote memory. Called after a feed reconnect: quotes
    /// seen before the gap no longer describe the current book.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Evaluates one quote and updates previous-quote memory.
    pub fn on_quote(&mut self, q: &Quote) -> Option<Signal> {
        let prev = self.prev.replace(*q);

        if q.spread() != self.tick_px {
            return None;
        }
        // Require a level change; the first quote after start/reset counts.
        if let Some(p) = prev {
            if q.bid_px == p.bid_px || q.ask_px == p.ask_px {
                return None;
            }
        }
        let total = q.bid_size + q.ask_size;
        if total <= 0 {
            return None;
        }
        let r = q.bid_size as f64 / total as f64;
        // Strict inequality: a tie at the threshold is no signal, so the
        // boundary cannot flap.
        if r > self.upper {
            Some(Signal {
                side: Side::Buy,
                strength: r,
            })
        } else if r < self.lower {
            Some(Signal {
                side: Side::Sell,
                strength: r,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn quote(bid_px: i64, bid_size: i64, ask_px: i64, ask_size: i64) -> Quote {
        Quote {
            bid_px,
            bid_size,
            ask_px,
            ask_size,
            ts_ns: 0,
        }
    }

    fn evaluator() -> SignalEvaluator {
        SignalEvaluator::new(0.8, 0.2, 1)
    }

    #[test]
    fn wide_spread_never_signals() {
        let mut ev = evaluator();
        // Two-tick spread with an extreme imbalance still returns nothing.
        assert_eq!(ev.on_quote(&quote(10_00, 900, 10_02, 100)), None);
        assert_eq!(ev.on_quote(&quote(10_01, 10_000, 10_04, 1)), None);
    }

    #[test]
    fn zero_total_size_is_no_signal() {
        let mut ev = evaluator();
        assert_eq!(ev.on_quote(&quote(10_00, 0, 10_01, 0)), None);
    }

    #[test]
    fn heavy_bid_signals_buy() {
        let mut ev = evaluator();
        let sig = ev.on_quote(&quote(10_00, 900, 10_01, 100)).unwrap();
        assert_eq!(sig.side, Side::Buy);
        assert!(sig.strength > 0.8);
    }

    #[test]
    fn heavy_ask_signals_sell() {
        let mut ev = evaluator();
        let sig = ev.on_quote(&quote(10_00, 100, 10_01, 900)).unwrap();
        assert_eq!(sig.side, Side::Sell);
        assert!(sig.strength < 0.2);
    }

    #[test]
    fn tie_at_threshold_is_no_signal() {
        let mut ev = evaluator();
        // r == 0.8 exactly (800 / 1000)
        assert_eq!(ev.on_quote(&quote(10_00, 800, 10_01, 200)), None);
        // r == 0.2 exactly on a fresh level
        let mut ev = evaluator();
        assert_eq!(ev.on_quote(&quote(10_00, 200, 10_01, 800)), None);
    }

    #[test]
    fn same_level_does_not_refire() {
        let mut ev = evaluator();
        let q = quote(10_00, 900, 10_01, 100);
        assert!(ev.on_quote(&q).is_some());
        // Same prices again, even heavier book: not a level change.
        assert_eq!(ev.on_quote(&quote(10_00, 950, 10_01, 50)), None);
        // Only the bid moved: still not a level change.
        assert_eq!(ev.on_quote(&quote(9_99, 900, 10_01, 100)), None);
        // Both sides moved: fires again.
        assert!(ev.on_quote(&quote(10_02, 900, 10_03, 100)).is_some());
    }

    #[test]
    fn reset_clears_level_memory() {
        let mut ev = evaluator();
        let q = quote(10_00, 900, 10_01, 100);
        assert!(ev.on_quote(&q).is_some());
        assert_eq!(ev.on_quote(&q), None);
        ev.reset();
        assert!(ev.on_quote(&q).is_some());
    }
}
