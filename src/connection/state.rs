//! Connection lifecycle state

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Lifecycle of the notification channel.
///
/// `Failed` is reachable only when `max_attempts` is configured; the
/// default policy retries forever and leaves the loop only on an
/// explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not started, or explicitly stopped
    Disconnected,
    /// Dial in progress
    Connecting,
    /// Channel open, frames flowing
    Connected,
    /// Channel lost, waiting out the retry delay
    Reconnecting,
    /// Retry budget exhausted
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, advisory view of the connection state.
///
/// Written only by the connection task; readable from anywhere. Reads
/// are for display and never gate dispatch.
#[derive(Debug)]
pub(crate) struct StateCell {
    inner: RwLock<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(ConnectionState::Disconnected),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set(&self, next: ConnectionState) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if *guard != next {
            tracing::debug!(from = %*guard, to = %next, "Connection state changed");
            *guard = next;
        }
    }
}
