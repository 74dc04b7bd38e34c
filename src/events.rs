//! Lifecycle events and their fan-out to subscribers.
//!
//! The session state machine emits [`LifecycleEvent`]s; the
//! [`EventBroadcaster`] delivers each event synchronously, in emission
//! order, to every registered handler. Handler panics are isolated so a
//! misbehaving subscriber cannot starve the others or unwind into the
//! state machine.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

/// A normalized, ordered notification describing a session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LifecycleEvent {
    /// The link to the target peripheral is up.
    Connected,
    /// GATT discovery finished and notification subscriptions are in
    /// place; the session is streaming.
    ServicesReady,
    /// A subscribed characteristic pushed a notification payload.
    DataReceived(Bytes),
    /// The session ended because the peripheral link went down.
    Disconnected,
    /// The connection attempt failed, was rejected, or timed out.
    ConnectFailed,
}

type Handler = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;
type HandlerList = RwLock<Vec<(u64, Handler)>>;

/// Handle returned by [`EventBroadcaster::on_event`]; dropping it
/// unregisters the handler.
pub struct SubscriberHandle {
    id: u64,
    handlers: Weak<HandlerList>,
}

impl SubscriberHandle {
    /// Unregister this handler.
    pub fn unregister(self) {
        // Drop does the work.
    }

    /// Get the subscriber ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers.write().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Fans lifecycle events out to registered subscribers.
///
/// Two subscription surfaces are offered: [`on_event`](Self::on_event)
/// registers a callback invoked synchronously during
/// [`publish`](Self::publish), and [`subscribe`](Self::subscribe) hands
/// out a channel receiver for consumers that prefer to pull. Neither
/// replays events to late subscribers.
pub struct EventBroadcaster {
    handlers: Arc<HandlerList>,
    next_id: AtomicU64,
    channel_tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster with no subscribers.
    pub fn new() -> Self {
        let (channel_tx, _) = broadcast::channel(64);

        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
            channel_tx,
        }
    }

    /// Register a handler called for every subsequent event.
    pub fn on_event<F>(&self, handler: F) -> SubscriberHandle
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers.write().push((id, Arc::new(handler)));

        SubscriberHandle {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Get a channel receiver for subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.channel_tx.subscribe()
    }

    /// Deliver `event` to every currently registered subscriber, in
    /// registration order, then return.
    pub fn publish(&self, event: &LifecycleEvent) {
        // Handlers are invoked outside the lock so a callback may
        // register or unregister subscribers without deadlocking.
        let handlers: Vec<(u64, Handler)> = self
            .handlers
            .read()
            .iter()
            .map(|(id, h)| (*id, h.clone()))
            .collect();

        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| (*handler)(event))).is_err() {
                warn!("Event handler {} panicked on {:?}", id, event);
            }
        }

        let _ = self.channel_tx.send(event.clone());
    }

    /// Number of registered callback handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delivery_in_registration_order() {
        let broadcaster = EventBroadcaster::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_a = seen.clone();
        let _a = broadcaster.on_event(move |_| seen_a.lock().push("a"));
        let seen_b = seen.clone();
        let _b = broadcaster.on_event(move |_| seen_b.lock().push("b"));

        broadcaster.publish(&LifecycleEvent::Connected);

        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let broadcaster = EventBroadcaster::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _bad = broadcaster.on_event(|_| panic!("subscriber bug"));
        let seen_ok = seen.clone();
        let _ok = broadcaster.on_event(move |event| seen_ok.lock().push(event.clone()));

        broadcaster.publish(&LifecycleEvent::Disconnected);
        broadcaster.publish(&LifecycleEvent::ConnectFailed);

        assert_eq!(
            *seen.lock(),
            vec![LifecycleEvent::Disconnected, LifecycleEvent::ConnectFailed]
        );
    }

    #[test]
    fn test_dropping_handle_unregisters() {
        let broadcaster = EventBroadcaster::new();
        let seen = Arc::new(Mutex::new(0u32));

        let seen_inner = seen.clone();
        let handle = broadcaster.on_event(move |_| *seen_inner.lock() += 1);
        broadcaster.publish(&LifecycleEvent::Connected);

        handle.unregister();
        broadcaster.publish(&LifecycleEvent::Connected);

        assert_eq!(*seen.lock(), 1);
        assert_eq!(broadcaster.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_subscribers_get_events_in_order() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(&LifecycleEvent::Connected);
        broadcaster.publish(&LifecycleEvent::ServicesReady);

        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Connected);
        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::ServicesReady);
    }

    #[test]
    fn test_no_replay_to_late_subscribers() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.publish(&LifecycleEvent::Connected);

        let seen = Arc::new(Mutex::new(0u32));
        let seen_inner = seen.clone();
        let _handle = broadcaster.on_event(move |_| *seen_inner.lock() += 1);

        assert_eq!(*seen.lock(), 0);
    }
}
