//! Fan-out of immutable snapshots to any number of subscribers.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::trace;

/// Publishes shared, immutable items to every live subscriber.
///
/// Each subscriber gets its own unbounded FIFO channel, so a slow subscriber
/// never blocks the publisher or the other subscribers. Items published
/// before a subscription are not replayed.
pub struct Publisher<T> {
    subscribers: Mutex<Vec<Sender<Arc<T>>>>,
}

impl<T> Publisher<T> {
    /// Create a publisher with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to items published from now on.
    pub fn subscribe(&self) -> Receiver<Arc<T>> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Publish an item, dropping subscribers whose receiver is gone.
    pub fn publish(&self, item: T) -> Arc<T> {
        let item = Arc::new(item);
        self.publish_shared(Arc::clone(&item));
        item
    }

    /// Publish an already shared item.
    pub fn publish_shared(&self, item: Arc<T>) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| sender.send(Arc::clone(&item)).is_ok());
        trace!(subscribers = subscribers.len(), "Published item");
    }

    /// Number of subscribers still connected as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_sees_items_in_order() {
        let publisher = Publisher::new();
        let a = publisher.subscribe();
        let b = publisher.subscribe();

        publisher.publish(1);
        publisher.publish(2);

        assert_eq!(*a.recv().unwrap(), 1);
        assert_eq!(*a.recv().unwrap(), 2);
        assert_eq!(*b.recv().unwrap(), 1);
        assert_eq!(*b.recv().unwrap(), 2);
    }

    #[test]
    fn test_subscribers_share_one_snapshot() {
        let publisher = Publisher::new();
        let a = publisher.subscribe();
        let b = publisher.subscribe();

        let item = publisher.publish(vec![1.0f32, 2.0]);

        assert!(Arc::ptr_eq(&a.recv().unwrap(), &item));
        assert!(Arc::ptr_eq(&b.recv().unwrap(), &item));
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let publisher = Publisher::new();
        publisher.publish(1);
        let late = publisher.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let publisher = Publisher::new();
        let kept = publisher.subscribe();
        drop(publisher.subscribe());

        publisher.publish(7);

        assert_eq!(publisher.subscriber_count(), 1);
        assert_eq!(*kept.recv().unwrap(), 7);
    }
}
