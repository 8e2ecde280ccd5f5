//! Repository observers and the weak registry that holds them.
//!
//! The registry never keeps an observer alive: entries are [`Weak`] handles
//! and expired ones are skipped on every notification.

use std::sync::{Arc, Weak};

use crate::error::SyncError;

/// Receives repository state changes.
///
/// Callbacks run synchronously while the repository's state is locked, so
/// implementations must not block or call back into the repository.
pub trait RepositoryObserver<T>: Send + Sync {
    /// The data held by the repository changed.
    ///
    /// Fires when the carried value changes, not on sync-status changes:
    /// `Synced(v)` becoming `NotSynced(v)` is silent.
    fn on_data_changed(&self, data: &T);

    /// A sync failed. The repository state tells what data is still held.
    fn on_sync_failed(&self, _error: &SyncError) {}
}

struct Entry<T> {
    key: usize,
    observer: Weak<dyn RepositoryObserver<T>>,
}

/// Weakly-held observers in registration order.
pub struct ObserverRegistry<T> {
    entries: Vec<Entry<T>>,
}

impl<T> ObserverRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register an observer. Registering the same observer again replaces
    /// the earlier registration.
    pub fn add<O>(&mut self, observer: &Arc<O>)
    where
        O: RepositoryObserver<T> + 'static,
    {
        let key = key_of(observer);
        self.entries
            .retain(|entry| entry.key != key && entry.observer.strong_count() > 0);

        let weak: Weak<dyn RepositoryObserver<T>> = Arc::downgrade(observer) as _;
        self.entries.push(Entry {
            key,
            observer: weak,
        });
    }

    /// Unregister an observer. Does nothing if it was never registered.
    pub fn remove<O>(&mut self, observer: &Arc<O>)
    where
        O: RepositoryObserver<T> + 'static,
    {
        let key = key_of(observer);
        self.entries.retain(|entry| entry.key != key);
    }

    /// Apply `f` to every live observer in registration order.
    pub fn notify(&self, mut f: impl FnMut(&dyn RepositoryObserver<T>)) {
        let live: Vec<Arc<dyn RepositoryObserver<T>>> = self
            .entries
            .iter()
            .filter_map(|entry| entry.observer.upgrade())
            .collect();

        for observer in &live {
            f(observer.as_ref());
        }
    }

    /// Number of observers still alive.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.observer.strong_count() > 0)
            .count()
    }

    /// True if no live observer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ObserverRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("live", &self.len())
            .finish()
    }
}

// Identity of the allocation, independent of the trait object vtable.
fn key_of<O>(observer: &Arc<O>) -> usize {
    Arc::as_ptr(observer) as *const () as usize
}
