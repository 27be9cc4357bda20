//! Shared Domain Types
//!
//! Identifiers shared across the ledger, session and protocol.

pub mod identifiers;

pub use identifiers::OrderId;
