//! Bounded frame mailbox between the reader thread and the render consumer.
//!
//! The queue favors recency over completeness: when full, [`FrameQueue::offer`]
//! evicts the single oldest frame and admits the new one in one step under
//! the internal lock, so the producer never blocks and the newest frame is
//! never dropped. One producer and one consumer may operate concurrently
//! without any caller-side locking.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::reassembler::Frame;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 5;

/// Fixed-capacity FIFO of frames with drop-oldest overflow.
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<VecDeque<Frame>>,
    available: Condvar,
    capacity: usize,
}

impl FrameQueue {
    /// Create a queue with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a queue bounded at `capacity` frames (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Recover the guard even if a holder panicked; the queue state is a
    /// plain `VecDeque` and stays consistent.
    fn guard(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a frame, evicting the oldest entry first if the queue is at
    /// capacity. Insertion always succeeds; the evicted frame (if any) is
    /// returned.
    pub fn offer(&self, frame: Frame) -> Option<Frame> {
        let evicted = {
            let mut queue = self.guard();
            let evicted = if queue.len() == self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(frame);
            evicted
        };
        self.available.notify_one();
        evicted
    }

    /// Remove and return the oldest frame, or `None` if the queue is empty.
    /// Never blocks.
    pub fn poll(&self) -> Option<Frame> {
        self.guard().pop_front()
    }

    /// Remove and return the oldest frame, waiting up to `timeout` for one
    /// to arrive.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.guard();
        loop {
            if let Some(frame) = queue.pop_front() {
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
        }
    }

    /// Remove all queued frames.
    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// The fixed capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(tag: u8) -> Frame {
        let mut bytes = vec![12u8, 0x80, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        bytes.push(tag);
        Frame::new(bytes, 12)
    }

    fn tag_of(frame: &Frame) -> u8 {
        frame.payload()[0]
    }

    #[test]
    fn test_offer_and_poll_fifo_order() {
        let queue = FrameQueue::new();
        for tag in 0..3 {
            assert!(queue.offer(frame(tag)).is_none());
        }
        assert_eq!(queue.len(), 3);
        for tag in 0..3 {
            assert_eq!(tag_of(&queue.poll().unwrap()), tag);
        }
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_capacity_bound_holds() {
        let queue = FrameQueue::new();
        for tag in 0..20 {
            queue.offer(frame(tag));
            assert!(queue.len() <= queue.capacity());
        }
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn test_overflow_evicts_exactly_the_oldest() {
        let queue = FrameQueue::with_capacity(5);
        for tag in 0..5 {
            assert!(queue.offer(frame(tag)).is_none());
        }

        // Sixth offer evicts frame 0 and keeps relative order of the rest
        let evicted = queue.offer(frame(5)).unwrap();
        assert_eq!(tag_of(&evicted), 0);
        assert_eq!(queue.len(), 5);

        let remaining: Vec<u8> = std::iter::from_fn(|| queue.poll()).map(|f| tag_of(&f)).collect();
        assert_eq!(remaining, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_clear_empties_queue() {
        let queue = FrameQueue::new();
        for tag in 0..4 {
            queue.offer(frame(tag));
        }
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_poll_timeout_returns_none_when_empty() {
        let queue = FrameQueue::new();
        let start = Instant::now();
        assert!(queue.poll_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_poll_timeout_wakes_on_offer() {
        let queue = Arc::new(FrameQueue::new());
        let producer_queue = Arc::clone(&queue);

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            producer_queue.offer(frame(7));
        });

        let frame = queue.poll_timeout(Duration::from_secs(2));
        producer.join().unwrap();

        assert_eq!(tag_of(&frame.unwrap()), 7);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let producer_queue = Arc::clone(&queue);
        let total = 500u16;

        let producer = thread::spawn(move || {
            for i in 0..total {
                producer_queue.offer(frame((i % 251) as u8));
            }
        });

        let mut received = 0usize;
        while !producer.is_finished() || !queue.is_empty() {
            if queue.poll().is_some() {
                received += 1;
            }
            assert!(queue.len() <= queue.capacity());
        }
        producer.join().unwrap();

        // Drop-oldest means some frames are evicted, never more than sent
        assert!(received <= total as usize);
    }
}
