//! Domain Layer
//!
//! Pure state and transition logic with no I/O. This layer defines:
//!
//! - **Orders**: lifecycle state machine and bracket decomposition
//! - **Positions**: weighted-cost accounting and trade history
//! - **Ledger**: the per-session authoritative store
//! - **Sync protocol**: snapshot and delta messages for observers
//!
//! # Modules
//!
//! - [`order`]: Order entity, request validation, status machine
//! - [`position`]: Position accounting and trade records
//! - [`ledger`]: Order ledger with event outbox
//! - [`market`]: Canonical ticks
//! - [`bot`]: Bot lifecycle status
//! - [`log`]: System log entries
//! - [`sync`]: Wire protocol

pub mod bot;
pub mod ledger;
pub mod log;
pub mod market;
pub mod order;
pub mod position;
pub mod shared;
pub mod sync;
