use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use super::cacheregistry::CacheRegistry;
use super::cachestats::{CacheCounters, CacheStats};
use crate::objectwithuuid::ObjectWithUUID;

struct ValueState<V> {
    value: Option<V>,
    in_process: bool,
}

struct ValueCore<V> {
    name: String,
    func: Box<dyn Fn() -> V + Send + Sync>,
    state: Mutex<ValueState<V>>,
    ready: Condvar,
    counters: CacheCounters,
}

impl<V: Clone> ValueCore<V> {
    fn clear(&self) {
        self.state.lock().value = None;
    }

    fn get(&self) -> V {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = &state.value {
                self.counters.record_hit();
                return value.clone();
            }
            if !state.in_process {
                break;
            }
            // The computer may have panicked, leaving no value; the loop then
            // elects a new one.
            while state.in_process {
                self.ready.wait(&mut state);
            }
        }

        state.in_process = true;
        drop(state);

        let outcome = catch_unwind(AssertUnwindSafe(|| (self.func)()));

        let mut state = self.state.lock();
        if let Ok(value) = &outcome {
            if state.value.is_some() {
                tracing::error!(cache = %self.name, "duplicate resolution of a cached value");
                debug_assert!(false, "duplicate resolution in cached value '{}'", self.name);
            }
            state.value = Some(value.clone());
        }
        state.in_process = false;
        drop(state);
        self.ready.notify_all();

        match outcome {
            Ok(value) => value,
            Err(payload) => resume_unwind(payload),
        }
    }
}

/// Memoizes a zero-argument computation ("lazy value") for concurrent callers.
///
/// The first caller computes; everyone arriving while that computation is in
/// progress blocks on a single shared condition variable and receives the
/// same value once it is published. [`clear`](Self::clear) marks the value
/// stale so the next caller recomputes it.
pub struct MemoizingValue<V>
where
    V: Clone + Send + Sync + 'static,
{
    core: Arc<ValueCore<V>>,
    uuid: Uuid,
    registry: Arc<CacheRegistry>,
}

impl<V> MemoizingValue<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F>(func: F, name: &str, registry: &Arc<CacheRegistry>) -> MemoizingValue<V>
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        let core = Arc::new(ValueCore {
            name: name.to_owned(),
            func: Box::new(func),
            state: Mutex::new(ValueState {
                value: None,
                in_process: false,
            }),
            ready: Condvar::new(),
            counters: CacheCounters::default(),
        });

        let uuid = Uuid::new_v4();
        let weak: Weak<ValueCore<V>> = Arc::downgrade(&core);
        registry.register(
            uuid,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.clear();
                }
            }),
        );

        MemoizingValue {
            core,
            uuid,
            registry: Arc::clone(registry),
        }
    }

    pub fn get(&self) -> V {
        self.core.counters.record_call();
        self.core.get()
    }

    pub fn clear(&self) {
        self.core.clear();
    }

    pub fn is_resolved(&self) -> bool {
        self.core.state.lock().value.is_some()
    }

    pub fn name(&self) -> &String {
        &self.core.name
    }

    pub fn stats(&self) -> CacheStats {
        self.core.counters.snapshot(&self.core.name)
    }
}

impl<V> ObjectWithUUID for MemoizingValue<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn uuid(&self) -> &Uuid {
        &self.uuid
    }
}

impl<V> Drop for MemoizingValue<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let stats = self.stats();
        tracing::debug!(
            cache = %stats.name(),
            hits = stats.hits(),
            total_calls = stats.total_calls(),
            "dropping memoizing value"
        );
        self.registry.unregister(&self.uuid);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn concurrent_callers_share_one_computation() {
        let registry = Arc::new(CacheRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value = Arc::new(MemoizingValue::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                vec![1.0_f64, 2.0, 3.0]
            },
            "annual_cost",
            &registry,
        ));
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let value = Arc::clone(&value);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    value.get()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().expect("caller should not panic"), vec![1.0, 2.0, 3.0]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(value.is_resolved());
    }

    #[test]
    fn clear_marks_value_stale() {
        let registry = Arc::new(CacheRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value = MemoizingValue::new(
            move || counter.fetch_add(1, Ordering::SeqCst) + 100,
            "counter",
            &registry,
        );

        assert_eq!(value.get(), 100);
        assert_eq!(value.get(), 100);
        assert_eq!(value.stats().hits(), 1);

        value.clear();
        assert!(!value.is_resolved());
        assert_eq!(value.get(), 101);

        registry.clear_all();
        assert_eq!(value.get(), 102);
    }

    #[test]
    fn panic_releases_waiters() {
        let registry = Arc::new(CacheRegistry::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let value = Arc::new(MemoizingValue::new(
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    thread::sleep(Duration::from_millis(30));
                    panic!("first attempt fails");
                }
                42_u32
            },
            "flaky",
            &registry,
        ));

        let first = {
            let value = Arc::clone(&value);
            thread::spawn(move || value.get())
        };
        thread::sleep(Duration::from_millis(10));
        let waiter = {
            let value = Arc::clone(&value);
            thread::spawn(move || value.get())
        };

        assert!(first.join().is_err());
        assert_eq!(waiter.join().expect("waiter retries after the panic"), 42);
        assert_eq!(value.get(), 42);
    }

    #[test]
    fn clear_during_computation_lets_it_publish() {
        let registry = Arc::new(CacheRegistry::new());
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value = Arc::new(MemoizingValue::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                started_tx.lock().send(()).ok();
                release_rx.lock().recv().ok();
                "curve".to_string()
            },
            "held",
            &registry,
        ));

        let computer = {
            let value = Arc::clone(&value);
            thread::spawn(move || value.get())
        };
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("computation should start");

        value.clear();
        registry.clear_all();
        assert!(!value.is_resolved());

        release_tx.send(()).expect("computation should be waiting");
        assert_eq!(computer.join().expect("computer should not panic"), "curve");

        assert!(value.is_resolved());
        assert_eq!(value.get(), "curve");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_unregisters() {
        let registry = Arc::new(CacheRegistry::new());
        let value = MemoizingValue::new(|| 1_u8, "tiny", &registry);
        assert_eq!(registry.len(), 1);
        drop(value);
        assert!(registry.is_empty());
    }
}
