//! Reconnecting WebSocket connection management.
//!
//! One background task keeps one logical channel alive: dial, keepalive,
//! read frames into the router, and on loss retry forever (or up to the
//! configured budget) behind a bounded delay. Transport faults never
//! escape this module.

mod backoff;
mod manager;
mod state;

pub use backoff::ReconnectBackoff;
pub use manager::{ClientStatsSnapshot, NotificationClient};
pub use state::ConnectionState;
