//! Listener registry
//!
//! Ordered callback lists. Callbacks are invoked in registration order with no
//! lock held, so a callback may call back into the manager. A panicking
//! callback is caught and logged; the remaining callbacks still run.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// A registered callback. Identity is the `Arc` pointer.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Listeners<T> {
    handlers: Arc<RwLock<Vec<Handler<T>>>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn add(&self, handler: Handler<T>) {
        self.handlers.write().push(handler);
    }

    /// Remove the first registration of `handler` (pointer comparison).
    pub fn remove(&self, handler: &Handler<T>) -> bool {
        remove_from(&self.handlers, handler)
    }

    /// Register `handler` and hand back its disposer.
    pub fn subscribe(&self, handler: Handler<T>) -> Subscription {
        self.add(Arc::clone(&handler));

        let handlers: Weak<RwLock<Vec<Handler<T>>>> = Arc::downgrade(&self.handlers);
        Subscription {
            dispose: Box::new(move || {
                if let Some(handlers) = handlers.upgrade() {
                    remove_from(&handlers, &handler);
                }
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Invoke every handler with `value`. Returns how many of them panicked.
    pub fn emit(&self, value: &T) -> usize {
        let handlers = self.handlers.read().clone();
        let mut panicked = 0;

        for (index, handler) in handlers.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
                panicked += 1;
                tracing::error!(listener = index, "Listener panicked, continuing fan-out");
            }
        }

        panicked
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

fn remove_from<T: 'static>(handlers: &RwLock<Vec<Handler<T>>>, handler: &Handler<T>) -> bool {
    let mut handlers = handlers.write();
    match handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
        Some(index) => {
            handlers.remove(index);
            true
        }
        None => false,
    }
}

/// Disposer returned by a subscription.
#[must_use = "the listener stays registered until `unsubscribe` is called"]
pub struct Subscription {
    dispose: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        (self.dispose)()
    }
}
