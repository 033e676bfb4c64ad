// ===============================
// src/lib.rs
// ===============================
//
// tick_taker — streaming order-book-imbalance tick taker for one security.
//
// Reacts to real-time bid/ask quote updates, fires when the spread is exactly
// one tick and the book is heavily imbalanced, and works small inventory-
// bounded limit orders: submit at the touch, cancel when the level moves,
// reconcile fills from the broker stream. One order outstanding at a time,
// one consumer for all state mutation.

pub mod alpaca;
pub mod config;
pub mod domain;
pub mod engine;
pub mod feed;
pub mod gateway;
pub mod gateway_alpaca;
pub mod metrics;
pub mod order;
pub mod position;
pub mod recorder;
pub mod signal;
