use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use super::cacheregistry::CacheRegistry;
use super::cachestats::{CacheCounters, CacheStats};
use super::inflightslot::InflightSlot;
use crate::objectwithuuid::ObjectWithUUID;

// ─────────────────────────────────────────────────────────────────────────────
// MemoizingCache：single-flight 快取，K → V
// ─────────────────────────────────────────────────────────────────────────────
//
// Per key the state is one of: absent, in flight (an `InflightSlot` in
// `in_flight`), or resolved (a value in `resolved`). The wrapped function runs
// with no lock held, so a slow key never blocks the others.

struct CacheState<K, V> {
    resolved: HashMap<K, V>,
    in_flight: HashMap<K, Arc<InflightSlot>>,
}

struct CacheCore<K, V> {
    name: String,
    func: Box<dyn Fn(&K) -> V + Send + Sync>,
    state: Mutex<CacheState<K, V>>,
    counters: CacheCounters,
}

enum Role {
    Computer(Arc<InflightSlot>),
    Waiter(Arc<InflightSlot>),
}

impl<K, V> CacheCore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn clear(&self) {
        self.state.lock().resolved.clear();
    }

    fn get(&self, key: &K) -> V {
        loop {
            let role = {
                let mut state = self.state.lock();
                if let Some(value) = state.resolved.get(key) {
                    self.counters.record_hit();
                    return value.clone();
                }
                // A released slot only lingers until its last waiter wakes;
                // it no longer stands for a computation.
                let loading = state
                    .in_flight
                    .get(key)
                    .filter(|slot| slot.is_loading())
                    .map(Arc::clone);
                match loading {
                    Some(slot) => {
                        slot.add_waiter();
                        Role::Waiter(slot)
                    }
                    None => {
                        let slot = Arc::new(InflightSlot::new_loading());
                        state.in_flight.insert(key.clone(), Arc::clone(&slot));
                        Role::Computer(slot)
                    }
                }
            };

            match role {
                Role::Computer(slot) => return self.compute(key, &slot),
                Role::Waiter(slot) => {
                    if let Some(value) = self.wait_for_peer(key, &slot) {
                        return value;
                    }
                    // The computer panicked or the cache was cleared in the
                    // meantime: start over, possibly as the new computer.
                }
            }
        }
    }

    fn compute(&self, key: &K, slot: &Arc<InflightSlot>) -> V {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.func)(key)));

        {
            let mut state = self.state.lock();
            if let Ok(value) = &outcome {
                if state.resolved.contains_key(key) {
                    tracing::error!(cache = %self.name, "duplicate resolution of a cached key");
                    debug_assert!(false, "duplicate resolution in cache '{}'", self.name);
                }
                state.resolved.insert(key.clone(), value.clone());
            }
            if slot.release() == 0 {
                Self::remove_slot(&mut state, key, slot);
            }
        }

        match outcome {
            Ok(value) => value,
            Err(payload) => resume_unwind(payload),
        }
    }

    fn wait_for_peer(&self, key: &K, slot: &Arc<InflightSlot>) -> Option<V> {
        slot.wait();
        let mut state = self.state.lock();
        if slot.remove_waiter() {
            Self::remove_slot(&mut state, key, slot);
        }
        let value = state.resolved.get(key).cloned();
        if value.is_some() {
            self.counters.record_hit();
        }
        value
    }

    fn remove_slot(state: &mut CacheState<K, V>, key: &K, slot: &Arc<InflightSlot>) {
        let is_current = state
            .in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot));
        if is_current {
            state.in_flight.remove(key);
        }
    }
}

/// Memoizes a deterministic function `K → V` for concurrent callers.
///
/// For any key at most one thread runs the wrapped function at a time; other
/// callers asking for the same key block until that result is published and
/// then share it. Callers asking for different keys never block each other.
///
/// If the wrapped function panics, the panic is resumed on the computing
/// thread after the in-flight entry is cleaned up; threads that were waiting
/// on it wake up and retry.
///
/// The cache registers itself with a [`CacheRegistry`] at construction and
/// unregisters on drop.
///
/// ```
/// use std::sync::Arc;
/// use riskcore::caching::cacheregistry::CacheRegistry;
/// use riskcore::caching::memoizingcache::MemoizingCache;
///
/// let registry = Arc::new(CacheRegistry::new());
/// let doubled = MemoizingCache::new(|k: &i64| k * 2, "doubled", &registry);
/// assert_eq!(doubled.get(5), 10);
/// assert_eq!(doubled.get(5), 10);
/// assert_eq!(doubled.stats().hits(), 1);
/// ```
pub struct MemoizingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    core: Arc<CacheCore<K, V>>,
    active: bool,
    uuid: Uuid,
    registry: Arc<CacheRegistry>,
}

impl<K, V> MemoizingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F>(func: F, name: &str, registry: &Arc<CacheRegistry>) -> MemoizingCache<K, V>
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        Self::new_with_activation(func, name, true, registry)
    }

    /// With `active == false` the cache is bypassed: every `get` calls the
    /// wrapped function directly and nothing is stored.
    pub fn new_with_activation<F>(
        func: F,
        name: &str,
        active: bool,
        registry: &Arc<CacheRegistry>,
    ) -> MemoizingCache<K, V>
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        let core = Arc::new(CacheCore {
            name: name.to_owned(),
            func: Box::new(func),
            state: Mutex::new(CacheState {
                resolved: HashMap::new(),
                in_flight: HashMap::new(),
            }),
            counters: CacheCounters::default(),
        });

        let uuid = Uuid::new_v4();
        let weak: Weak<CacheCore<K, V>> = Arc::downgrade(&core);
        registry.register(
            uuid,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.clear();
                }
            }),
        );

        MemoizingCache {
            core,
            active,
            uuid,
            registry: Arc::clone(registry),
        }
    }

    pub fn get(&self, key: K) -> V {
        self.core.counters.record_call();
        if self.active {
            self.core.get(&key)
        } else {
            (self.core.func)(&key)
        }
    }

    /// Discards every resolved entry. Computations already in flight still
    /// complete and publish their result.
    pub fn clear(&self) {
        self.core.clear();
    }

    pub fn name(&self) -> &String {
        &self.core.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.core.state.lock().resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.core.counters.snapshot(&self.core.name)
    }

    #[cfg(test)]
    fn in_flight_count(&self) -> usize {
        self.core.state.lock().in_flight.len()
    }
}

impl<K, V> ObjectWithUUID for MemoizingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn uuid(&self) -> &Uuid {
        &self.uuid
    }
}

impl<K, V> Drop for MemoizingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let stats = self.stats();
        tracing::debug!(
            cache = %stats.name(),
            hits = stats.hits(),
            total_calls = stats.total_calls(),
            "dropping memoizing cache"
        );
        self.registry.unregister(&self.uuid);
    }
}
