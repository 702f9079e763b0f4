//! Keyed debouncing of deferred actions.
//!
//! Each key owns at most one pending action. Scheduling again for the same
//! key supersedes the pending one and restarts the quiet window; other keys
//! are unaffected.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Slots<K> {
    next_generation: u64,
    pending: HashMap<K, Pending>,
}

pub struct Debouncer<K> {
    window: Duration,
    slots: Arc<Mutex<Slots<K>>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: Arc::new(Mutex::new(Slots {
                next_generation: 0,
                pending: HashMap::new(),
            })),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `action` once `window` has passed without another `schedule` for
    /// the same key. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, key: K, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.next_generation += 1;
        let generation = slots.next_generation;

        let task_slots = Arc::clone(&self.slots);
        let task_key = key.clone();
        let window = self.window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            {
                let mut slots = task_slots.lock().unwrap_or_else(PoisonError::into_inner);
                match slots.pending.get(&task_key) {
                    Some(pending) if pending.generation == generation => {
                        slots.pending.remove(&task_key);
                    }
                    // Superseded or cancelled between wake-up and here.
                    _ => return,
                }
            }
            action();
        });

        if let Some(previous) = slots.pending.insert(key, Pending { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Drop the pending action for `key`, if any. Returns whether one was
    /// pending.
    pub fn cancel(&self, key: &K) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.pending.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, pending) in slots.pending.drain() {
            pending.handle.abort();
        }
    }

    /// Number of keys with an action still waiting out its window.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, pending) in slots.pending.drain() {
            pending.handle.abort();
        }
    }
}
