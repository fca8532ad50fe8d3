use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of equal-width bins over `[0, 1]` in the bracket histogram.
pub const N_BINS: usize = 16;

/// Lock-free counters describing how integrations behaved. Reporting only;
/// nothing in the engine reads them back.
#[derive(Debug, Default)]
pub struct IntegrationStats {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    nans: AtomicU64,
    bracket_failures: AtomicU64,
    bracket_evals: AtomicU64,
    quadrature_evals: AtomicU64,
    max_evals_per_call: AtomicU64,
    max_bracket_evals: AtomicU64,
    max_successful_bracket_evals: AtomicU64,
    bracket_bins: [AtomicU64; N_BINS],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationStatsReport {
    pub captured_at: DateTime<Utc>,
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub nans: u64,
    pub bracket_failures: u64,
    pub bracket_evals: u64,
    pub quadrature_evals: u64,
    pub total_evals: u64,
    pub max_evals_per_call: u64,
    pub max_bracket_evals: u64,
    pub max_successful_bracket_evals: u64,
    pub bracket_bins: [u64; N_BINS],
}

/// Histogram bin of a bracket midpoint `c ∈ [0, 1]`.
pub fn bin_of(c: f64) -> usize {
    ((c * N_BINS as f64) as usize).min(N_BINS - 1)
}

impl IntegrationStats {
    pub fn new() -> IntegrationStats {
        IntegrationStats::default()
    }

    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one bracketing search. `within_budget` is `false` when the
    /// search used its whole sub-budget.
    pub(crate) fn record_search(&self, evaluations: u32, within_budget: bool) {
        let evaluations = u64::from(evaluations);
        self.bracket_evals.fetch_add(evaluations, Ordering::Relaxed);
        self.max_bracket_evals.fetch_max(evaluations, Ordering::Relaxed);
        if within_budget {
            self.max_successful_bracket_evals
                .fetch_max(evaluations, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_bracket(&self, midpoint: f64) {
        self.bracket_bins[bin_of(midpoint)].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bracket_failure(&self) {
        self.bracket_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// `quadrature` excludes the bracketing evaluations already recorded by
    /// [`record_search`](Self::record_search); `total` includes them.
    pub(crate) fn record_nan(&self, quadrature: u32, total: u32) {
        self.nans.fetch_add(1, Ordering::Relaxed);
        self.record_quadrature(quadrature, total);
    }

    pub(crate) fn record_finished(&self, quadrature: u32, total: u32, success: bool) {
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.record_quadrature(quadrature, total);
    }

    fn record_quadrature(&self, quadrature: u32, total: u32) {
        self.quadrature_evals
            .fetch_add(u64::from(quadrature), Ordering::Relaxed);
        self.max_evals_per_call
            .fetch_max(u64::from(total), Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.calls,
            &self.successes,
            &self.failures,
            &self.nans,
            &self.bracket_failures,
            &self.bracket_evals,
            &self.quadrature_evals,
            &self.max_evals_per_call,
            &self.max_bracket_evals,
            &self.max_successful_bracket_evals,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for bin in &self.bracket_bins {
            bin.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> IntegrationStatsReport {
        let bracket_evals = self.bracket_evals.load(Ordering::Relaxed);
        let quadrature_evals = self.quadrature_evals.load(Ordering::Relaxed);
        IntegrationStatsReport {
            captured_at: Utc::now(),
            calls: self.calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            nans: self.nans.load(Ordering::Relaxed),
            bracket_failures: self.bracket_failures.load(Ordering::Relaxed),
            bracket_evals,
            quadrature_evals,
            total_evals: bracket_evals + quadrature_evals,
            max_evals_per_call: self.max_evals_per_call.load(Ordering::Relaxed),
            max_bracket_evals: self.max_bracket_evals.load(Ordering::Relaxed),
            max_successful_bracket_evals: self
                .max_successful_bracket_evals
                .load(Ordering::Relaxed),
            bracket_bins: std::array::from_fn(|i| self.bracket_bins[i].load(Ordering::Relaxed)),
        }
    }

    pub fn log_summary(&self) {
        let report = self.snapshot();
        tracing::info!(
            calls = report.calls,
            successes = report.successes,
            failures = report.failures,
            nans = report.nans,
            bracket_failures = report.bracket_failures,
            bracket_evals = report.bracket_evals,
            quadrature_evals = report.quadrature_evals,
            total_evals = report.total_evals,
            max_evals_per_call = report.max_evals_per_call,
            max_bracket_evals = report.max_bracket_evals,
            max_successful_bracket_evals = report.max_successful_bracket_evals,
            bracket_bins = ?report.bracket_bins,
            "integration statistics"
        );
    }
}
