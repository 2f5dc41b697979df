use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use super::classifier::classify;
use super::types::{EventKind, NotificationEvent};

/// Consumer callback invoked for every classified event.
///
/// An `Err` return is logged and isolated; it never reaches sibling
/// subscriptions or the connection loop.
pub type EventCallback = Arc<dyn Fn(&NotificationEvent) -> anyhow::Result<()> + Send + Sync>;

/// Opaque handle used to cancel a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: Uuid,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

struct Subscription {
    /// Registration sequence; dispatch order follows it
    seq: u64,
    callback: EventCallback,
}

/// Result of routing one frame
#[derive(Debug, Clone, Serialize)]
pub struct RouteResult {
    /// Classification the frame received
    pub kind: EventKind,
    /// Number of subscriptions whose callback returned Ok
    pub delivered_to: usize,
    /// Number of subscriptions whose callback returned an error
    pub failed: usize,
}

/// Statistics for the message router
#[derive(Debug, Default)]
pub struct RouterStats {
    /// Frames routed (exactly one event each)
    pub total_routed: AtomicU64,
    /// Successful callback deliveries
    pub total_delivered: AtomicU64,
    /// Callback invocations that returned an error
    pub callback_errors: AtomicU64,
    /// Events that fell into the Unclassified kind
    pub unclassified: AtomicU64,
    /// Events carrying a should_refresh signal
    pub refresh_signals: AtomicU64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            total_routed: self.total_routed.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            refresh_signals: self.refresh_signals.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of router statistics
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatsSnapshot {
    pub total_routed: u64,
    pub total_delivered: u64,
    pub callback_errors: u64,
    pub unclassified: u64,
    pub refresh_signals: u64,
}

/// Classifies inbound frames and fans them out to subscriptions.
///
/// Fan-out is synchronous and in registration order; a frame routed while
/// no subscriptions exist is classified, counted, and discarded, never
/// buffered.
pub struct MessageRouter {
    subscriptions: DashMap<Uuid, Subscription>,
    next_seq: AtomicU64,
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            next_seq: AtomicU64::new(0),
            stats: RouterStats::default(),
        }
    }

    /// Register a consumer callback; events are delivered until the
    /// returned handle is passed to [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&NotificationEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.insert(
            id,
            Subscription {
                seq,
                callback: Arc::new(callback),
            },
        );

        tracing::info!(
            subscription_id = %id,
            total_subscriptions = self.subscriptions.len(),
            "Subscription registered"
        );

        SubscriptionHandle { id }
    }

    /// Remove a subscription. Safe to call at any time, including from a
    /// callback during dispatch; takes effect for the next frame. Returns
    /// whether the handle was still live.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.subscriptions.remove(&handle.id).is_some();
        if removed {
            tracing::info!(
                subscription_id = %handle.id,
                total_subscriptions = self.subscriptions.len(),
                "Subscription removed"
            );
        }
        removed
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Get router statistics
    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Classify one raw frame and deliver the resulting event to every
    /// live subscription, at most once each.
    #[tracing::instrument(
        name = "router.route",
        skip(self, frame),
        fields(frame_len = frame.len())
    )]
    pub fn route(&self, frame: &str) -> RouteResult {
        let event = classify(frame);

        self.stats.total_routed.fetch_add(1, Ordering::Relaxed);
        if event.kind == EventKind::Unclassified {
            self.stats.unclassified.fetch_add(1, Ordering::Relaxed);
        }
        if event.should_refresh {
            self.stats.refresh_signals.fetch_add(1, Ordering::Relaxed);
        }

        let (delivered, failed) = self.dispatch(&event);

        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .callback_errors
            .fetch_add(failed as u64, Ordering::Relaxed);

        tracing::debug!(
            kind = %event.kind,
            should_refresh = event.should_refresh,
            delivered = delivered,
            failed = failed,
            "Dispatched event"
        );

        RouteResult {
            kind: event.kind,
            delivered_to: delivered,
            failed,
        }
    }

    /// Invoke every live callback with the same event, in registration
    /// order, isolating per-callback errors.
    fn dispatch(&self, event: &NotificationEvent) -> (usize, usize) {
        // Snapshot before invoking anything: subscribe/unsubscribe during
        // dispatch must not affect delivery of the in-flight event, and no
        // map lock may be held while a callback runs
        let mut snapshot: Vec<(u64, Uuid, EventCallback)> = self
            .subscriptions
            .iter()
            .map(|entry| (entry.seq, *entry.key(), entry.callback.clone()))
            .collect();
        snapshot.sort_unstable_by_key(|(seq, _, _)| *seq);

        let mut delivered = 0;
        let mut failed = 0;
        for (_, id, callback) in snapshot {
            match callback(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        subscription_id = %id,
                        error = %e,
                        "Subscriber callback failed"
                    );
                }
            }
        }

        (delivered, failed)
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_delivery_in_registration_order() {
        let router = MessageRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 1..=3 {
            let seen = seen.clone();
            router.subscribe(move |_event| {
                seen.lock().unwrap().push(tag);
                Ok(())
            });
        }

        let result = router.route("ping");
        assert_eq!(result.delivered_to, 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_callback_error_is_isolated() {
        let router = MessageRouter::new();
        let delivered = Arc::new(Mutex::new(Vec::new()));

        router.subscribe(|_event| anyhow::bail!("boom"));
        {
            let delivered = delivered.clone();
            router.subscribe(move |event| {
                delivered.lock().unwrap().push(event.text.clone());
                Ok(())
            });
        }

        let result = router.route("hola");
        assert_eq!(result.delivered_to, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(*delivered.lock().unwrap(), vec!["hola".to_string()]);

        let stats = router.stats();
        assert_eq!(stats.callback_errors, 1);
        assert_eq!(stats.total_delivered, 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let router = MessageRouter::new();
        let count = Arc::new(Mutex::new(0u32));

        let handle = {
            let count = count.clone();
            router.subscribe(move |_event| {
                *count.lock().unwrap() += 1;
                Ok(())
            })
        };

        router.route("uno");
        assert!(router.unsubscribe(&handle));
        router.route("dos");

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(router.subscription_count(), 0);
        // Second removal of the same handle is a no-op
        assert!(!router.unsubscribe(&handle));
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let router = Arc::new(MessageRouter::new());
        let own_handle: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let sibling_count = Arc::new(Mutex::new(0u32));

        let handle = {
            let router = router.clone();
            let own_handle = own_handle.clone();
            router.clone().subscribe(move |_event| {
                // Cancel ourselves mid-dispatch; must not disturb siblings
                if let Some(handle) = own_handle.lock().unwrap().take() {
                    router.unsubscribe(&handle);
                }
                Ok(())
            })
        };
        *own_handle.lock().unwrap() = Some(handle);

        {
            let sibling_count = sibling_count.clone();
            router.subscribe(move |_event| {
                *sibling_count.lock().unwrap() += 1;
                Ok(())
            });
        }

        // Event N: both callbacks run, the first removes itself
        let result = router.route("primero");
        assert_eq!(result.delivered_to, 2);
        assert_eq!(router.subscription_count(), 1);

        // Event N+1: only the sibling remains
        let result = router.route("segundo");
        assert_eq!(result.delivered_to, 1);
        assert_eq!(*sibling_count.lock().unwrap(), 2);
    }

    #[test]
    fn test_frame_without_subscribers_is_discarded() {
        let router = MessageRouter::new();

        let result = router.route(r#"{"type":"USER_CREATED"}"#);
        assert_eq!(result.kind, EventKind::UserCreated);
        assert_eq!(result.delivered_to, 0);
        assert_eq!(result.failed, 0);

        // The frame was classified and counted, not buffered: a late
        // subscriber sees nothing
        let count = Arc::new(Mutex::new(0u32));
        {
            let count = count.clone();
            router.subscribe(move |_event| {
                *count.lock().unwrap() += 1;
                Ok(())
            });
        }
        assert_eq!(*count.lock().unwrap(), 0);
        assert_eq!(router.stats().total_routed, 1);
    }

    #[test]
    fn test_stats_counters() {
        let router = MessageRouter::new();
        router.subscribe(|_event| Ok(()));

        router.route("ping"); // unclassified, refresh
        router.route(r#"{"type":"USER_DELETED"}"#); // classified, refresh
        router.route(r#"{"type":"UNKNOWN","text":"x"}"#); // unclassified, no refresh

        let stats = router.stats();
        assert_eq!(stats.total_routed, 3);
        assert_eq!(stats.total_delivered, 3);
        assert_eq!(stats.unclassified, 2);
        assert_eq!(stats.refresh_signals, 2);
        assert_eq!(stats.callback_errors, 0);
    }
}
