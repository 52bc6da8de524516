//! Lane queue
//!
//! Unbounded MPMC FIFO guarded by a mutex and condition variable. Closing
//! the queue is the end-of-stream signal: once closed and empty it stays
//! empty, which is what lets workers decide to exit without racing the
//! producer.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Result of a dequeue attempt
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued<T> {
    Item(T),
    /// Nothing available right now; more may arrive.
    Empty,
    /// Closed and empty. Permanent.
    Drained,
}

impl<T> Dequeued<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            Dequeued::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn is_drained(&self) -> bool {
        matches!(self, Dequeued::Drained)
    }
}

/// Enqueue on a closed queue; hands the item back
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Debug for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueClosed(..)")
    }
}

impl<T> fmt::Display for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("enqueue on a closed queue")
    }
}

impl<T> std::error::Error for QueueClosed<T> {}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct LaneQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    // Mirror of items.len(), readable without the lock
    len: AtomicUsize,
}

impl<T> LaneQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            len: AtomicUsize::new(0),
        }
    }

    /// Append an item and wake one blocked consumer
    pub fn enqueue(&self, item: T) -> Result<(), QueueClosed<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueClosed(item));
        }
        state.items.push_back(item);
        self.len.store(state.items.len(), Ordering::Relaxed);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    pub fn try_dequeue(&self) -> Dequeued<T> {
        let mut state = self.state.lock();
        self.take(&mut state)
    }

    /// Block up to `timeout` for an item
    pub fn dequeue(&self, timeout: Duration) -> Dequeued<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        loop {
            match self.take(&mut state) {
                Dequeued::Empty => {}
                ready => return ready,
            }

            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        return self.take(&mut state);
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Stop accepting items. Queued items are still delivered.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Approximate length; may lag concurrent enqueue/dequeue
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, state: &mut State<T>) -> Dequeued<T> {
        match state.items.pop_front() {
            Some(item) => {
                self.len.store(state.items.len(), Ordering::Relaxed);
                Dequeued::Item(item)
            }
            None if state.closed => Dequeued::Drained,
            None => Dequeued::Empty,
        }
    }
}

impl<T> Default for LaneQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let q = LaneQueue::new();
        for i in 0..5 {
            q.enqueue(i).unwrap();
        }
        assert_eq!(q.len(), 5);

        let drained: Vec<i32> = (0..5).filter_map(|_| q.try_dequeue().into_item()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert_eq!(q.try_dequeue(), Dequeued::Empty);
        assert!(q.is_empty());
    }

    #[test]
    fn test_dequeue_times_out_when_empty() {
        let q: LaneQueue<u32> = LaneQueue::new();
        let start = Instant::now();
        assert_eq!(q.dequeue(Duration::from_millis(20)), Dequeued::Empty);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_close_delivers_remaining_then_drains() {
        let q = LaneQueue::new();
        q.enqueue("a").unwrap();
        q.close();

        assert!(q.is_closed());
        assert!(q.enqueue("b").is_err());
        assert_eq!(q.try_dequeue(), Dequeued::Item("a"));
        assert!(q.try_dequeue().is_drained());
        assert!(q.dequeue(Duration::from_secs(5)).is_drained());
    }

    #[test]
    fn test_enqueue_wakes_blocked_consumer() {
        let q = Arc::new(LaneQueue::new());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.dequeue(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        q.enqueue(7u32).unwrap();
        assert_eq!(consumer.join().unwrap(), Dequeued::Item(7));
    }

    #[test]
    fn test_close_wakes_blocked_consumers() {
        let q: Arc<LaneQueue<u32>> = Arc::new(LaneQueue::new());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.dequeue(Duration::from_secs(10)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        q.close();
        for c in consumers {
            assert!(c.join().unwrap().is_drained());
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_concurrent_consumers_see_each_item_once() {
        let q = Arc::new(LaneQueue::new());
        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..500 {
                        q.enqueue(p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    loop {
                        match q.dequeue(Duration::from_millis(5)) {
                            Dequeued::Item(v) => seen.push(v),
                            Dequeued::Empty => {}
                            Dequeued::Drained => return seen,
                        }
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        q.close();

        let mut all = HashSet::new();
        let mut total = 0;
        for c in consumers {
            for v in c.join().unwrap() {
                total += 1;
                all.insert(v);
            }
        }
        assert_eq!(total, 2000);
        assert_eq!(all.len(), 2000);
    }
}
