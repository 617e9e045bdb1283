//! Unread-message counter
//!
//! Process-local cache of the backend's unread count. Listeners hear about a
//! value only when it actually changes.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::listeners::{Handler, Listeners, Subscription};

#[derive(Default)]
struct Tally {
    count: u64,
    /// Version of the last fetched value applied
    version: u64,
}

#[derive(Clone, Default)]
pub struct UnreadCounter {
    tally: Arc<Mutex<Tally>>,
    listeners: Listeners<u64>,
}

impl UnreadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.tally.lock().count
    }

    /// Overwrite with an authoritative value. Returns whether it changed.
    pub fn set(&self, value: u64) -> bool {
        self.update(|_| value)
    }

    /// Apply a value fetched by the refresh numbered `version`. Returns
    /// `None`, leaving the count alone, if a later refresh already landed.
    pub fn set_fetched(&self, value: u64, version: u64) -> Option<bool> {
        let changed = {
            let mut tally = self.tally.lock();
            if version < tally.version {
                return None;
            }
            tally.version = version;
            replace(&mut tally.count, value)
        };

        Some(self.announce(changed))
    }

    pub fn increment(&self) -> bool {
        self.update(|count| count.saturating_add(1))
    }

    /// Floors at zero.
    pub fn decrement(&self) -> bool {
        self.update(|count| count.saturating_sub(1))
    }

    pub fn reset(&self) -> bool {
        self.update(|_| 0)
    }

    pub fn subscribe(&self, handler: Handler<u64>) -> Subscription {
        self.listeners.subscribe(handler)
    }

    fn update(&self, f: impl FnOnce(u64) -> u64) -> bool {
        let changed = {
            let mut tally = self.tally.lock();
            let next = f(tally.count);
            replace(&mut tally.count, next)
        };

        self.announce(changed)
    }

    fn announce(&self, changed: Option<u64>) -> bool {
        match changed {
            Some(value) => {
                tracing::debug!(count = value, "Unread count changed");
                self.listeners.emit(&value);
                true
            }
            None => false,
        }
    }
}

fn replace(count: &mut u64, next: u64) -> Option<u64> {
    if next == *count {
        None
    } else {
        *count = next;
        Some(next)
    }
}
