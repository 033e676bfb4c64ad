// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}
impl Side {
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Best bid/ask snapshot. Prices are integer cents (1 tick = 1 unit).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub bid_px: i64,
    pub bid_size: i64,
    pub ask_px: i64,
    pub ask_size: i64,
    pub ts_ns: i128,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error("crossed or locked book: bid {bid_px} >= ask {ask_px}")]
    Crossed { bid_px: i64, ask_px: i64 },
    #[error("non-positive size: bid_size {bid_size}, ask_size {ask_size}")]
    NonPositiveSize { bid_size: i64, ask_size: i64 },
}

impl Quote {
    pub fn spread(&self) -> i64 {
        self.ask_px - self.bid_px
    }

    /// A bid at or through the ask means a locked/crossed book; such quotes
    /// are dropped by the engine rather than traded on.
    pub fn validate(&self) -> Result<(), QuoteError> {
        if self.bid_px >= self.ask_px {
            return Err(QuoteError::Crossed {
                bid_px: self.bid_px,
                ask_px: self.ask_px,
            });
        }
        if self.bid_size <= 0 || self.ask_size <= 0 {
            return Err(QuoteError::NonPositiveSize {
                bid_size: self.bid_size,
                ask_size: self.ask_size,
            });
        }
        Ok(())
    }
}

/// Order-book-imbalance signal. Ephemeral: derived per quote, never recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub side: Side,
    /// Imbalance ratio bid_size / (bid_size + ask_size) that produced it.
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecStatus {
    Ack,
    PartialFill,
    Filled,
    Cancelled,
    Rejected(String),
}

impl ExecStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExecStatus::Ack => "ack",
            ExecStatus::PartialFill => "partial",
            ExecStatus::Filled => "filled",
            ExecStatus::Cancelled => "cancelled",
            ExecStatus::Rejected(_) => "rejected",
        }
    }
}

/// Execution report from the broker stream. `filled_qty` is cumulative,
/// matching how the vendor reports fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecReport {
    pub client_id: String,
    pub broker_id: Option<String>,
    pub symbol: String,
    pub status: ExecStatus,
    pub filled_qty: i64,
    pub remaining_qty: i64,
    pub ts_ns: i128,
}

/// Request from the engine to the order-submission sink. Fire-and-forget;
/// the outcome comes back later as an ExecReport on the event channel.
#[derive(Debug, Clone)]
pub enum OrderCommand {
    Place {
        client_id: String,
        symbol: String,
        side: Side,
        qty: i64,
        limit_px: i64,
    },
    Cancel {
        client_id: String,
        symbol: String,
        broker_id: Option<String>,
    },
}

/// Tagged event consumed by the single engine dispatch loop. Quote and exec
/// events are serialized into one ordered channel so position/order state
/// never races.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Quote(Quote),
    Exec(ExecReport),
    /// Market-data transport reconnected; previous-quote memory is invalid.
    FeedReset,
    Shutdown,
}

/// Journal record for the optional JSONL recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Quote(Quote),
    Order(crate::order::OpenOrder),
    Exec(ExecReport),
    Note(String),
}
