use parking_lot::{Condvar, Mutex};

// ─────────────────────────────────────────────────────────────────────────────
// InflightSlot：一個 key 正在被計算時，等待者共用的通知點
// ─────────────────────────────────────────────────────────────────────────────
//
// The slot only blocks and wakes waiters; it never guards cache contents.
// Callers always take the owning cache's lock first and this slot's lock
// second, never the reverse.

#[derive(Debug, Clone, Copy)]
struct SlotState {
    loading: bool,
    waiters: usize,
}

#[derive(Debug)]
pub struct InflightSlot {
    state: Mutex<SlotState>,
    cv: Condvar,
}

impl InflightSlot {
    /// A slot whose computation has just started and has no waiters yet.
    pub fn new_loading() -> InflightSlot {
        InflightSlot {
            state: Mutex::new(SlotState {
                loading: true,
                waiters: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Registers the caller as a waiter. Call with the cache lock held so the
    /// computer cannot finish between the lookup and the registration.
    pub fn add_waiter(&self) {
        let mut state = self.state.lock();
        state.waiters = state.waiters.saturating_add(1);
    }

    /// Blocks until the computation is released.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.loading {
            self.cv.wait(&mut state);
        }
    }

    /// Unregisters a waiter after it woke up. Returns `true` when no waiters
    /// remain, in which case the caller is responsible for dropping the slot
    /// from the in-flight map.
    pub fn remove_waiter(&self) -> bool {
        let mut state = self.state.lock();
        state.waiters = state.waiters.saturating_sub(1);
        state.waiters == 0
    }

    /// Marks the computation finished and wakes every waiter. Returns the
    /// number of waiters still registered at that moment.
    pub fn release(&self) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            state.loading = false;
            state.waiters
        };
        self.cv.notify_all();
        waiters
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }
}
