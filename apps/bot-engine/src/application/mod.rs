//! Application Layer
//!
//! Orchestrates the domain through bot sessions. It defines:
//!
//! - **Ports**: Interfaces for brokers, feeds and observers
//! - **Session**: The per-bot worker owning ledger, broker and feed

pub mod ports;
pub mod session;

pub use ports::*;
pub use session::{
    BotSession, SessionConfig, SessionError, SessionEvent, SessionHandle, SessionSnapshot,
};
