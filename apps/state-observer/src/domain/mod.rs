//! Domain Layer - Reconciled observer state.
//!
//! Pure state and transition logic with no I/O. The store consumes decoded
//! protocol messages and never writes back to the engine.

/// Bounded system log ring.
pub mod log_buffer;

/// Snapshot + delta reconciliation.
pub mod store;
