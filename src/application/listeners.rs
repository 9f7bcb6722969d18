//! Callback registry with handle-based removal.
//!
//! Listeners are invoked in registration order. Removing one never changes
//! the relative order of the others. Callbacks run outside the registry
//! lock, so a listener may register or remove listeners while being
//! notified; such changes apply from the next notification on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle returned by [`ListenerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of callbacks receiving `&T`.
pub struct ListenerRegistry<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Callback<T>)>>,
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Appends a listener.
    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invokes every listener with `value`, in registration order.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Callback<T>)>> {
        // Callbacks never run under the lock, so poisoning cannot leave the
        // list half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
