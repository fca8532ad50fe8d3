use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Hit/call counters of one cache, for offline reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    name: String,
    hits: u64,
    total_calls: u64,
}

impl CacheStats {
    pub fn new(name: String, hits: u64, total_calls: u64) -> CacheStats {
        CacheStats {
            name,
            hits,
            total_calls,
        }
    }

    pub fn name(&self) -> &String {
        &self.name
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    pub fn hit_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_calls as f64
        }
    }
}

/// Live counters shared by both cache flavours.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    total_calls: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn record_call(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, name: &str) -> CacheStats {
        CacheStats::new(
            name.to_owned(),
            self.hits.load(Ordering::Relaxed),
            self.total_calls.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_of_unused_cache_is_zero() {
        let stats = CacheStats::new("unused".to_owned(), 0, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn counters_snapshot() {
        let counters = CacheCounters::default();
        counters.record_call();
        counters.record_call();
        counters.record_hit();

        let stats = counters.snapshot("demand");
        assert_eq!(stats.name(), "demand");
        assert_eq!(stats.total_calls(), 2);
        assert_eq!(stats.hits(), 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-12);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_calls"], 2);
    }
}
