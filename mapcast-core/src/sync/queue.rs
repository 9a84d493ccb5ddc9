//! Bounded single-consumer queue with drop-oldest admission.
//!
//! [`push`](DropOldestQueue::push) never blocks: when the queue is full the
//! oldest pending item is evicted and handed back to the caller. The
//! consumer blocks in [`pop`](DropOldestQueue::pop) until an item arrives
//! or the queue is closed.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    evicted: u64,
}

/// A depth-bounded queue favouring the newest items.
#[derive(Debug)]
pub struct DropOldestQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
    capacity: usize,
}

/// Outcome of a [`DropOldestQueue::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    /// Stored without eviction.
    Queued,
    /// Stored; the returned oldest item was evicted to make room.
    Evicted(T),
    /// The queue is closed; the item is handed back.
    Closed(T),
}

impl<T> DropOldestQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                evicted: 0,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue `item`, evicting the oldest pending item if full.
    pub fn push(&self, item: T) -> Admission<T> {
        let mut state = self.lock();
        if state.closed {
            return Admission::Closed(item);
        }
        let evicted = if state.items.len() >= self.capacity {
            state.evicted += 1;
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        drop(state);
        self.ready.notify_one();
        match evicted {
            Some(old) => Admission::Evicted(old),
            None => Admission::Queued,
        }
    }

    /// Block until an item is available.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take an item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Stop accepting items. Pending items are still delivered.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Close and discard everything pending, returning how many were
    /// discarded.
    pub fn abort(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let n = state.items.len();
        state.items.clear();
        drop(state);
        self.ready.notify_all();
        n
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total items evicted by full-queue admissions.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let q = DropOldestQueue::new(2);
        assert_eq!(q.push(1), Admission::Queued);
        assert_eq!(q.push(2), Admission::Queued);
        assert_eq!(q.push(3), Admission::Evicted(1));
        assert_eq!(q.push(4), Admission::Evicted(2));
        assert_eq!(q.evicted(), 2);
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), Some(4));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn close_drains_then_ends() {
        let q = DropOldestQueue::new(4);
        q.push("a");
        q.close();
        assert_eq!(q.push("b"), Admission::Closed("b"));
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn abort_discards_pending() {
        let q = DropOldestQueue::new(4);
        q.push(1);
        q.push(2);
        assert_eq!(q.abort(), 2);
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn pop_wakes_on_push_and_close() {
        let q = Arc::new(DropOldestQueue::new(1));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut got = Vec::new();
                while let Some(v) = q.pop() {
                    got.push(v);
                }
                got
            })
        };
        thread::sleep(Duration::from_millis(20));
        q.push(7);
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(consumer.join().unwrap(), vec![7]);
    }

    #[test]
    fn zero_capacity_is_one() {
        let q = DropOldestQueue::new(0);
        assert_eq!(q.capacity(), 1);
        q.push(1);
        assert_eq!(q.push(2), Admission::Evicted(1));
    }
}
