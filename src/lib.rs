// Infrastructure (shared components)
pub mod config;
pub mod error;

// Domain
pub mod connection;
pub mod notification;

// Re-exports for the common path
pub use config::Settings;
pub use connection::{ClientStatsSnapshot, ConnectionState, NotificationClient};
pub use error::{ClientError, Result};
pub use notification::{
    classify, EventCallback, EventKind, MessageRouter, NotificationEvent, RouteResult,
    RouterStatsSnapshot, SubscriptionHandle,
};
