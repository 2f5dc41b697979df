//! Frame classification and event dispatch.
//!
//! Every inbound frame becomes exactly one [`NotificationEvent`]: JSON
//! objects are classified through the closed discriminator table,
//! anything else degrades to [`EventKind::Unclassified`] plain text. The
//! [`MessageRouter`] fans each event out to its subscriptions in
//! registration order, isolating per-callback failures.

mod classifier;
mod router;
mod types;

pub use classifier::classify;
pub use router::{
    EventCallback, MessageRouter, RouteResult, RouterStatsSnapshot, SubscriptionHandle,
};
pub use types::{EventKind, NotificationEvent};
