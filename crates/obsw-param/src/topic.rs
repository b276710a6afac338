//! Typed publish/subscribe with synchronous delivery.
//!
//! Subscribers register at application startup; publishing walks the
//! list under the topic's mutex and invokes every handler on the
//! publisher's thread, in registration order. Publishing from within a
//! handler of the same topic deadlocks and is forbidden.

use std::sync::Mutex;

type Handler<T> = Box<dyn Fn(&T) + Send>;

pub struct Topic<T> {
    subscriptions: Mutex<Vec<Handler<T>>>,
    max_subscriptions: usize,
}

impl<T> Topic<T> {
    pub fn new(max_subscriptions: usize) -> Self {
        Self {
            subscriptions: Mutex::new(Vec::with_capacity(max_subscriptions)),
            max_subscriptions,
        }
    }

    /// Registers a handler. Returns `false` when all subscription slots
    /// are taken.
    pub fn subscribe<F: Fn(&T) + Send + 'static>(&self, handler: F) -> bool {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if subscriptions.len() >= self.max_subscriptions {
            return false;
        }
        subscriptions.push(Box::new(handler));
        true
    }

    /// Delivers `message` to every subscriber, in registration order, on
    /// the calling thread.
    pub fn publish(&self, message: &T) {
        let subscriptions = self.subscriptions.lock().unwrap();
        for handler in subscriptions.iter() {
            handler(message);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}
