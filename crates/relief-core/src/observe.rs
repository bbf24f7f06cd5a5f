//! Replay-1 observable values.
//!
//! State that used to be "whatever the last publisher emitted" (sync progress,
//! pull stats) flows through [`ObservedValue`]: setting a value notifies every
//! live subscriber, a new subscriber is immediately replayed the latest value,
//! and setting a value equal to the current one is a no-op, so consumers never
//! see consecutive duplicates.
//!
//! Callbacks run on the thread calling [`ObservedValue::set`] and must not
//! subscribe or unsubscribe from within the callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Shared<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

pub struct ObservedValue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ObservedValue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> ObservedValue<T> {
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new(initial),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        lock_recover(&self.shared.value).clone()
    }

    /// Stores and broadcasts `value` unless it equals the current value.
    pub fn set(&self, value: T) {
        {
            let mut current = lock_recover(&self.shared.value);
            if *current == value {
                return;
            }
            *current = value.clone();
        }
        for (_, callback) in lock_recover(&self.shared.subscribers).iter() {
            callback(&value);
        }
    }

    /// Registers `callback` and immediately replays the latest value to it.
    /// Dropping the returned [`Subscription`] unregisters.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription<T> {
        callback(&self.get());
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        lock_recover(&self.shared.subscribers).push((id, Box::new(callback)));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct Subscription<T> {
    id: u64,
    shared: Weak<Shared<T>>,
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            lock_recover(&shared.subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}
