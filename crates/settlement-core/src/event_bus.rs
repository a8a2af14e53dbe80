//! A broadcast-backed event bus with an explicit start/stop listener
//! lifecycle: the handle returned by `start()` is the same
//! handle `stop()` consumes, so the subscribed-listener count is symmetric
//! around a `start()`/`stop()` pair.

use tokio::sync::broadcast;

/// Default channel capacity: large enough to absorb a burst of
/// `SettlementRequired` events between a slow consumer's `.recv()` calls
/// without the publisher ever blocking.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// A single subscription to an [`EventBus`]. Captured once at `start()`
/// and handed back to `stop()` unchanged, per the listener-symmetry
/// invariant.
pub struct ListenerHandle<T> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> ListenerHandle<T> {
    /// Awaits the next event, skipping over any the receiver lagged past.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A `tokio::sync::broadcast` channel wrapped so that every subscriber is
/// a [`ListenerHandle`] rather than a raw `Receiver`.
pub struct EventBus<T: Clone + Send + 'static> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    /// Registers a new listener. The bound handle is the `receiver` inside
    /// the returned [`ListenerHandle`]; it is the only reference `stop()`
    /// needs to unregister it.
    pub fn start(&self) -> ListenerHandle<T> {
        ListenerHandle {
            receiver: self.sender.subscribe(),
        }
    }

    /// Unregisters `handle`. Dropping the inner receiver is what actually
    /// decrements the broadcast channel's subscriber count; this method
    /// exists so callers have a `start()`/`stop()` pair to reason about
    /// rather than relying on drop order.
    pub fn stop(&self, handle: ListenerHandle<T>) {
        drop(handle);
    }

    pub fn publish(&self, event: T) {
        // No active listeners is not an error: the bus has no durability
        // guarantee for events published before the first `start()`.
        let _ = self.sender.send(event);
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_started_listener() {
        let bus: EventBus<u32> = EventBus::default();
        let mut handle = bus.start();
        bus.publish(42);
        assert_eq!(handle.recv().await, Some(42));
    }

    #[tokio::test]
    async fn stop_is_symmetric_with_start() {
        let bus: EventBus<u32> = EventBus::default();
        let before = bus.listener_count();
        let handle = bus.start();
        assert_eq!(bus.listener_count(), before + 1);
        bus.stop(handle);
        assert_eq!(bus.listener_count(), before);
    }

    #[tokio::test]
    async fn multiple_listeners_all_receive() {
        let bus: EventBus<u32> = EventBus::default();
        let mut a = bus.start();
        let mut b = bus.start();
        bus.publish(7);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }
}
