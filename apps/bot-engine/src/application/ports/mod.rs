//! Application Ports (Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Broker**: order routing to a venue
//! - **DataFeed**: real-time ticks into a session queue
//! - **StatePublisher**: state changes out to observers

mod broker_port;
mod feed_port;
mod state_publisher_port;

pub use broker_port::{Broker, BrokerError};
pub use feed_port::{DataFeed, FeedError, FeedEvent, FeedSink};
pub use state_publisher_port::{RecordingStatePublisher, StatePublisher};
