//! Bounded blocking queue of shared handles.
//!
//! Sending clones the handle into the queue (for reference-counted
//! handles this takes a reference); receiving blocks up to a timeout.
//! Multiple producers and consumers are allowed.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("timed out waiting for an item")]
    Timeout,
}

pub struct ReferenceQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    available: Condvar,
}

impl<T: Clone> ReferenceQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Condvar::new(),
        }
    }

    /// Clones `item` into the queue. Fails immediately when full.
    pub fn send(&self, item: &T) -> Result<(), QueueError> {
        let mut items = self.items.lock().unwrap();
        if items.len() >= self.capacity {
            return Err(QueueError::Full);
        }
        items.push_back(item.clone());
        drop(items);
        self.available.notify_one();
        Ok(())
    }

    /// Interrupt-context variant of [`send`](Self::send): never blocks,
    /// not even on the queue lock. The boolean reports whether a waiting
    /// consumer was woken, so the caller can yield to it.
    pub fn send_from_isr(&self, item: &T) -> (Result<(), QueueError>, bool) {
        let Ok(mut items) = self.items.try_lock() else {
            return (Err(QueueError::Full), false);
        };
        if items.len() >= self.capacity {
            return (Err(QueueError::Full), false);
        }
        let woke_consumer = items.is_empty();
        items.push_back(item.clone());
        drop(items);
        self.available.notify_one();
        (Ok(()), woke_consumer)
    }

    /// Waits up to `timeout` for an item.
    pub fn receive(&self, timeout: Duration) -> Result<T, QueueError> {
        let items = self.items.lock().unwrap();
        let (mut items, result) = self
            .available
            .wait_timeout_while(items, timeout, |items| items.is_empty())
            .unwrap();
        if result.timed_out() && items.is_empty() {
            return Err(QueueError::Timeout);
        }
        Ok(items.pop_front().expect("queue is non-empty"))
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.lock().unwrap().len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_buffer::SharedBufferPool;
    use std::sync::Arc;

    #[test]
    fn full_queue_rejects_immediately() {
        let queue = ReferenceQueue::new(2);
        queue.send(&1u32).unwrap();
        queue.send(&2u32).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.send(&3u32), Err(QueueError::Full));
    }

    #[test]
    fn receive_times_out_on_empty_queue() {
        let queue: ReferenceQueue<u8> = ReferenceQueue::new(1);
        assert!(queue.is_empty());
        assert_eq!(
            queue.receive(Duration::from_millis(10)),
            Err(QueueError::Timeout)
        );
    }

    #[test]
    fn fifo_order() {
        let queue = ReferenceQueue::new(4);
        for i in 0..4u32 {
            queue.send(&i).unwrap();
        }
        for i in 0..4u32 {
            assert_eq!(queue.receive(Duration::ZERO), Ok(i));
        }
    }

    #[test]
    fn sending_a_shared_handle_takes_a_reference() {
        let pool = SharedBufferPool::new(16, 1);
        let handle = pool.allocate().unwrap();
        let queue = ReferenceQueue::new(1);

        queue.send(&handle).unwrap();
        assert_eq!(handle.refcount(), 2);

        let received = queue.receive(Duration::ZERO).unwrap();
        assert_eq!(received.refcount(), 2);
        drop(handle);
        assert_eq!(received.refcount(), 1);
    }

    #[test]
    fn isr_send_reports_a_woken_consumer() {
        let queue = ReferenceQueue::new(2);
        let (result, woke) = queue.send_from_isr(&1u32);
        assert_eq!(result, Ok(()));
        assert!(woke);

        let (result, woke) = queue.send_from_isr(&2u32);
        assert_eq!(result, Ok(()));
        assert!(!woke);

        let (result, _) = queue.send_from_isr(&3u32);
        assert_eq!(result, Err(QueueError::Full));
    }

    #[test]
    fn receive_unblocks_on_send() {
        let queue = Arc::new(ReferenceQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.receive(Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.send(&7u32).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(7));
    }
}
