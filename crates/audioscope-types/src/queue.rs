//! Clock-paced handoff queue.

use std::collections::VecDeque;
use std::time::Instant;

use crate::blocks::Timestamped;

/// Bounded FIFO of timestamped items drained against an external clock.
///
/// A render loop pushes everything it receives and, once per pass, fetches
/// the items whose timestamp the sink clock has already reached. When the
/// consumer falls behind, the oldest items are evicted instead of growing
/// the queue or blocking the producer.
#[derive(Debug)]
pub struct TimedQueue<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T: Timestamped> TimedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an item, evicting the oldest one when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Move every item stamped at or before `t` into `dest`.
    ///
    /// Stops at the first item still in the future.
    pub fn fetch_up_to<E: Extend<T>>(&mut self, t: Instant, dest: &mut E) {
        while let Some(front) = self.items.front() {
            if front.timestamp() > t {
                break;
            }
            if let Some(item) = self.items.pop_front() {
                dest.extend(std::iter::once(item));
            }
        }
    }

    /// Timestamp of the oldest queued item.
    pub fn next_timestamp(&self) -> Option<Instant> {
        self.items.front().map(Timestamped::timestamp)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        t: Instant,
        id: u32,
    }

    impl Timestamped for Item {
        fn timestamp(&self) -> Instant {
            self.t
        }
    }

    fn items(base: Instant, count: u32) -> Vec<Item> {
        (0..count)
            .map(|id| Item {
                t: base + Duration::from_millis(u64::from(id) * 10),
                id,
            })
            .collect()
    }

    #[test]
    fn test_fetch_stops_at_first_future_item() {
        let base = Instant::now();
        let mut queue = TimedQueue::new(16);
        for item in items(base, 5) {
            queue.push(item);
        }

        let mut out = Vec::new();
        queue.fetch_up_to(base + Duration::from_millis(25), &mut out);

        assert_eq!(out.iter().map(|i| i.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(out.iter().all(|i| i.t <= base + Duration::from_millis(25)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next_timestamp(), Some(base + Duration::from_millis(30)));
    }

    #[test]
    fn test_fetch_includes_items_exactly_at_clock() {
        let base = Instant::now();
        let mut queue = TimedQueue::new(4);
        queue.push(Item { t: base, id: 0 });

        let mut out = Vec::new();
        queue.fetch_up_to(base, &mut out);
        assert_eq!(out.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fetch_before_first_item_returns_nothing() {
        let base = Instant::now();
        let mut queue = TimedQueue::new(4);
        queue.push(Item {
            t: base + Duration::from_secs(1),
            id: 0,
        });

        let mut out = Vec::new();
        queue.fetch_up_to(base, &mut out);
        assert!(out.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_push_beyond_capacity_evicts_oldest() {
        let base = Instant::now();
        let mut queue = TimedQueue::new(3);
        for item in items(base, 5) {
            queue.push(item);
        }

        assert_eq!(queue.len(), 3);
        let mut out = Vec::new();
        queue.fetch_up_to(base + Duration::from_secs(1), &mut out);
        assert_eq!(out.iter().map(|i| i.id).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert!(out.windows(2).all(|w| w[0].t <= w[1].t));
    }

    #[test]
    fn test_zero_capacity_holds_one_item() {
        let base = Instant::now();
        let mut queue = TimedQueue::new(0);
        for item in items(base, 2) {
            queue.push(item);
        }
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.len(), 1);
    }
}
