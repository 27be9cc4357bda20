//! Order Context
//!
//! Order value objects, the lifecycle state machine and the order entity.
//!
//! # Key Concepts
//!
//! - **Cumulative fills**: venues report total filled quantity, never increments
//! - **Canonical status**: every venue vocabulary maps onto five states
//! - **Brackets**: a parent entry plus contingent take-profit and stop-loss legs

pub mod entity;
pub mod request;
pub mod state_machine;
pub mod value_objects;

pub use entity::{BracketLink, Order};
pub use request::{OrderRequest, OrderValidationError};
pub use state_machine::OrderStateMachine;
pub use value_objects::{BracketRole, OrderSide, OrderStatus, OrderType};
