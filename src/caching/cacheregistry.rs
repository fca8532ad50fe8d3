use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

/// Callback invoked by [`CacheRegistry::clear_all`] for one registered cache.
pub type ClearCallback = Box<dyn Fn() + Send + Sync>;

/// Directory of live caches and the callbacks that empty them.
///
/// Every cached numeric result implicitly depends on the integration settings
/// that were active when it was computed, so whoever changes those settings
/// calls [`clear_all`](Self::clear_all) on the registry the caches were built
/// against.
///
/// The registry is an ordinary value owned by an
/// [`IntegrationContext`](crate::integration::integrationcontext::IntegrationContext)
/// and handed to caches at construction, which keeps unrelated contexts (and
/// tests) isolated from each other.
///
/// `register`, `unregister` and `clear_all` are mutually exclusive. A clear
/// callback takes its own cache's lock, so the lock order is always
/// registry → cache; no cache ever calls into the registry while holding its
/// own lock.
pub struct CacheRegistry {
    entries: Mutex<HashMap<Uuid, ClearCallback>>,
}

impl CacheRegistry {
    pub fn new() -> CacheRegistry {
        CacheRegistry {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Adds `clear_fn` under `handle`, replacing any callback already
    /// registered under the same handle.
    pub fn register(&self, handle: Uuid, clear_fn: ClearCallback) {
        self.entries.lock().insert(handle, clear_fn);
    }

    /// Removes the callback registered under `handle`. Returns `false` if
    /// nothing was registered under it.
    pub fn unregister(&self, handle: &Uuid) -> bool {
        self.entries.lock().remove(handle).is_some()
    }

    /// Invokes every registered clear callback.
    pub fn clear_all(&self) {
        let entries = self.entries.lock();
        tracing::info!(caches = entries.len(), "clearing all registered caches");
        for clear_fn in entries.values() {
            clear_fn();
        }
    }

    pub fn contains(&self, handle: &Uuid) -> bool {
        self.entries.lock().contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        CacheRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn clear_all_invokes_every_callback() {
        let registry = CacheRegistry::new();
        let cleared = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let cleared = Arc::clone(&cleared);
            registry.register(
                Uuid::new_v4(),
                Box::new(move || {
                    cleared.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        registry.clear_all();
        assert_eq!(cleared.load(Ordering::SeqCst), 3);

        registry.clear_all();
        assert_eq!(cleared.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn unregistered_callbacks_are_not_invoked() {
        let registry = CacheRegistry::new();
        let cleared = Arc::new(AtomicUsize::new(0));
        let handle = Uuid::new_v4();
        let counter = Arc::clone(&cleared);
        registry.register(
            handle,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(registry.contains(&handle));

        assert!(registry.unregister(&handle));
        assert!(!registry.unregister(&handle));
        assert!(registry.is_empty());

        registry.clear_all();
        assert_eq!(cleared.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn separate_registries_are_isolated() {
        let first = CacheRegistry::new();
        let second = CacheRegistry::new();
        first.register(Uuid::new_v4(), Box::new(|| {}));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);
    }
}
