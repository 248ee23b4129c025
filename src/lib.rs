#![doc = include_str!("../docs/rustdoc.md")]

/// Command-line argument definitions.
pub mod cli;
/// WebSocket transport and reconnect backoff.
pub mod client;
/// Runtime configuration model.
pub mod config;
/// Connection handle, state signal and listener registry.
pub mod connection;
/// Error types used across the crate.
pub mod error;
/// Update bus between the feed and the UI.
pub mod events;
/// Bounded event history and channel listeners.
pub mod feed;
/// Terminal output formatters.
pub mod formatter;
/// Single-session connection lifecycle.
pub mod manager;
/// Metrics and health status structures.
pub mod monitoring;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Transport seam used by the manager.
pub mod transport;
/// Channel table, records and wire message shapes.
pub mod types;
/// UI controller and presentation loop.
pub mod ui;

/// Primary crate error type.
pub use error::FeedError;
pub use connection::{Connection, ConnectionState};
pub use feed::{EventFeed, RetainedFeed};
pub use manager::ConnectionManager;
pub use types::{Channel, ChannelEvent, Credential, EventRecord};
