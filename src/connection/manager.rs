//! Connection manager owning the notification channel lifecycle

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::Settings;
use crate::error::ClientError;
use crate::notification::{
    MessageRouter, NotificationEvent, RouterStatsSnapshot, SubscriptionHandle,
};

use super::backoff::ReconnectBackoff;
use super::state::{ConnectionState, StateCell};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why an established session ended
enum SessionEnd {
    /// Explicit stop; no further reconnects
    Shutdown,
    /// Transport lost; schedule a retry
    Lost,
}

/// Statistics for the connection manager
#[derive(Debug, Default)]
pub struct ClientStats {
    /// Successful connects, first connect included
    pub connects: AtomicU64,
    /// Retries scheduled after a failed or lost session
    pub reconnect_attempts: AtomicU64,
    /// Data frames received across all sessions
    pub frames_received: AtomicU64,
    /// Keepalive payloads sent (one per successful connect)
    pub keepalives_sent: AtomicU64,
}

impl ClientStats {
    pub fn snapshot(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of connection statistics
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatsSnapshot {
    pub connects: u64,
    pub reconnect_attempts: u64,
    pub frames_received: u64,
    pub keepalives_sent: u64,
}

/// Handle to the notification channel.
///
/// Owns a background task that keeps exactly one WebSocket alive for the
/// lifetime of the session: dial, send the keepalive, read frames into
/// the router, and on any transport fault wait out the backoff delay and
/// dial again. Transport faults never surface to consumers; the worst
/// observable behavior is delayed notifications plus the advisory
/// [`ConnectionState`].
///
/// All sharing happens through this handle: consumers register callbacks
/// with [`subscribe`](Self::subscribe) and read advisory state with
/// [`state`](Self::state). Dropping the handle signals the task to stop;
/// [`stop`](Self::stop) does the same and waits for it.
pub struct NotificationClient {
    router: Arc<MessageRouter>,
    state: Arc<StateCell>,
    stats: Arc<ClientStats>,
    shutdown: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationClient {
    /// Spawn the connection task and return the handle.
    ///
    /// Must be called within a Tokio runtime. The state leaves
    /// `Disconnected` as soon as the task begins dialing.
    pub fn start(settings: Settings) -> Self {
        let router = Arc::new(MessageRouter::new());
        let state = Arc::new(StateCell::new());
        let stats = Arc::new(ClientStats::default());
        let (shutdown, shutdown_rx) = broadcast::channel(1);

        let task = ConnectionTask {
            settings,
            router: router.clone(),
            state: state.clone(),
            stats: stats.clone(),
        };
        let handle = tokio::spawn(task.run(shutdown_rx));

        Self {
            router,
            state,
            stats,
            shutdown,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Register a consumer callback for classified events.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&NotificationEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.router.subscribe(callback)
    }

    /// Remove a subscription; returns whether the handle was still live.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.router.unsubscribe(handle)
    }

    pub fn subscription_count(&self) -> usize {
        self.router.subscription_count()
    }

    /// Advisory connection state for display; never gates dispatch.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Get connection statistics
    pub fn stats(&self) -> ClientStatsSnapshot {
        self.stats.snapshot()
    }

    /// Get router statistics
    pub fn router_stats(&self) -> RouterStatsSnapshot {
        self.router.stats()
    }

    /// Stop the channel for good: close the transport, end the task, no
    /// further reconnect attempts. Terminal; start a new client to
    /// reconnect after this.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(());
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Connection task ended abnormally");
            }
        }
        // Covers the task having already ended in Failed
        self.state.set(ConnectionState::Disconnected);
    }
}

impl Drop for NotificationClient {
    fn drop(&mut self) {
        // Best-effort teardown when stop() was never awaited
        let _ = self.shutdown.send(());
    }
}

/// Background task driving the reconnect loop.
struct ConnectionTask {
    settings: Settings,
    router: Arc<MessageRouter>,
    state: Arc<StateCell>,
    stats: Arc<ClientStats>,
}

impl ConnectionTask {
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let url = self.settings.ws_url();
        let mut backoff = ReconnectBackoff::new(self.settings.reconnect.clone());
        let max_attempts = self.settings.reconnect.max_attempts;

        tracing::info!(url = %url, "Notification client starting");

        loop {
            self.state.set(ConnectionState::Connecting);

            match self.connect(&url, &mut shutdown_rx).await {
                Ok(Some(ws)) => {
                    backoff.reset();
                    match self.run_session(ws, &mut shutdown_rx).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost => {}
                    }
                }
                // Shutdown requested while dialing
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, url = %url, "Connect attempt failed");
                }
            }

            self.state.set(ConnectionState::Reconnecting);
            self.stats.reconnect_attempts.fetch_add(1, Ordering::Relaxed);

            if let Some(max) = max_attempts {
                if backoff.attempt() >= max {
                    tracing::error!(
                        attempts = backoff.attempt(),
                        "Retry budget exhausted, giving up"
                    );
                    self.state.set(ConnectionState::Failed);
                    return;
                }
            }

            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state.set(ConnectionState::Disconnected);
        tracing::info!("Notification client stopped");
    }

    /// Dial once, bounded by the configured timeout. `Ok(None)` means
    /// shutdown was requested mid-dial.
    async fn connect(
        &self,
        url: &str,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> crate::error::Result<Option<WsStream>> {
        let timeout = Duration::from_secs(self.settings.websocket.connect_timeout);

        tokio::select! {
            _ = shutdown_rx.recv() => Ok(None),
            result = tokio::time::timeout(timeout, connect_async(url)) => match result {
                Ok(Ok((ws, _response))) => Ok(Some(ws)),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(ClientError::ConnectTimeout {
                    seconds: self.settings.websocket.connect_timeout,
                }),
            },
        }
    }

    /// Drive one established connection until it is lost or stopped.
    async fn run_session(
        &self,
        mut ws: WsStream,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        self.state.set(ConnectionState::Connected);
        self.stats.connects.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Notification channel connected");

        // One keepalive per connection instance, right after open. It
        // keeps idle-timeout middleboxes from dropping the channel and is
        // never surfaced to consumers.
        let keepalive = self.settings.websocket.keepalive_payload.clone();
        if let Err(e) = ws.send(Message::text(keepalive)).await {
            tracing::warn!(error = %e, "Failed to send keepalive");
            return SessionEnd::Lost;
        }
        self.stats.keepalives_sent.fetch_add(1, Ordering::Relaxed);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = ws.close(None).await;
                    return SessionEnd::Shutdown;
                }
                frame = ws.next() => match frame {
                    Some(Ok(message)) => {
                        if !self.handle_frame(&mut ws, message).await {
                            return SessionEnd::Lost;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Transport error, scheduling reconnect");
                        return SessionEnd::Lost;
                    }
                    None => {
                        tracing::warn!("Notification channel closed by server");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }

    /// Process one inbound frame. Returns false once the connection is
    /// gone. Frames are routed one at a time, in arrival order; dispatch
    /// for a frame completes before the next frame is read.
    async fn handle_frame(&self, ws: &mut WsStream, message: Message) -> bool {
        match message {
            Message::Text(text) => {
                self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                self.router.route(text.as_str());
                true
            }
            Message::Binary(data) => {
                // The server only sends text; decode rather than drop
                self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                let text = String::from_utf8_lossy(&data);
                self.router.route(&text);
                true
            }
            Message::Ping(payload) => ws.send(Message::Pong(payload)).await.is_ok(),
            Message::Pong(_) => true,
            Message::Close(frame) => {
                tracing::info!(frame = ?frame, "Received close frame");
                false
            }
            // Raw frames are not produced by the high-level reader
            Message::Frame(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectConfig;

    fn unreachable_settings() -> Settings {
        let mut settings = Settings::default();
        // Port 1 is never listening on loopback; dials fail immediately
        settings.server.host = "127.0.0.1".to_string();
        settings.server.port = 1;
        settings.reconnect = ReconnectConfig {
            initial_delay_ms: 10,
            max_delay_ms: 50,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: None,
        };
        settings
    }

    async fn wait_for_state(client: &NotificationClient, want: ConnectionState) -> bool {
        for _ in 0..200 {
            if client.state() == want {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_retrying() {
        let client = NotificationClient::start(unreachable_settings());

        assert!(wait_for_state(&client, ConnectionState::Reconnecting).await);
        // No Failed state without a retry budget
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_ne!(client.state(), ConnectionState::Failed);
        assert!(client.stats().reconnect_attempts >= 1);

        client.stop().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stop_is_terminal() {
        let mut settings = unreachable_settings();
        // Long delay parks the task in the retry sleep
        settings.reconnect.initial_delay_ms = 5_000;
        let client = NotificationClient::start(settings);

        assert!(wait_for_state(&client, ConnectionState::Reconnecting).await);
        let attempts_before = client.stats().reconnect_attempts;

        client.stop().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // No further retries after stop
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.stats().reconnect_attempts, attempts_before);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_retry_budget_reaches_failed() {
        let mut settings = unreachable_settings();
        settings.reconnect.max_attempts = Some(1);
        let client = NotificationClient::start(settings);

        assert!(wait_for_state(&client, ConnectionState::Failed).await);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_subscriptions_delegate_to_router() {
        let client = NotificationClient::start(unreachable_settings());

        let handle = client.subscribe(|_event| Ok(()));
        assert_eq!(client.subscription_count(), 1);
        assert!(client.unsubscribe(&handle));
        assert_eq!(client.subscription_count(), 0);

        client.stop().await;
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = ClientStats::default();
        stats.connects.fetch_add(2, Ordering::Relaxed);
        stats.frames_received.fetch_add(7, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connects, 2);
        assert_eq!(snapshot.frames_received, 7);
        assert_eq!(snapshot.keepalives_sent, 0);
    }
}
