use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Bracketing：在 t ∈ [0, 1] 上先找到「有東西」的區間
// ─────────────────────────────────────────────────────────────────────────────
//
// Integration over x ∈ [0, ∞) happens in t = 1/(x + 1), so t = 1 is x = 0 and
// t = 0 is x = ∞. An integrand that is below machine epsilon almost
// everywhere would fool a plain Simpson estimate into returning zero, so the
// engine first probes for a sub-interval whose midpoint is non-negligible.

/// Largest subdivision count a search walks before the probe spacing drops
/// under `f64` resolution on `[0, 1]`.
const MAX_INTERVALS: u64 = 1 << 52;

pub fn x_from_t(t: f64) -> f64 {
    if t == 0.0 { f64::INFINITY } else { 1.0 / t - 1.0 }
}

pub fn t_from_x(x: f64) -> f64 {
    1.0 / (x + 1.0)
}

/// Integrands are assumed non-negative: the test is signed, so a strictly
/// negative sample counts as negligible. `NaN` is not negligible; the search
/// stops on it and the quadrature engine then reports the NaN.
pub fn is_negligible(y: f64) -> bool {
    y <= f64::EPSILON
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    a: f64,
    b: f64,
    evaluations: u32,
}

impl Bracket {
    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    pub fn evaluations(&self) -> u32 {
        self.evaluations
    }

    pub fn midpoint(&self) -> f64 {
        (self.a + self.b) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchResult {
    Found(Bracket),
    /// The budget ran out before any non-negligible sample turned up. This is
    /// ambiguous between "the integrand is zero" and "the search missed it".
    NotFound { evaluations: u32 },
}

impl SearchResult {
    pub fn evaluations(&self) -> u32 {
        match self {
            SearchResult::Found(bracket) => bracket.evaluations,
            SearchResult::NotFound { evaluations } => *evaluations,
        }
    }

    pub fn bracket(&self) -> Option<&Bracket> {
        match self {
            SearchResult::Found(bracket) => Some(bracket),
            SearchResult::NotFound { .. } => None,
        }
    }
}

/// A bracketing heuristic. Implementations differ only in the order in which
/// they probe midpoints of `[0, 1]`.
///
/// `f` is evaluated at ordinary domain points `x`; `budget` bounds the number
/// of evaluations, the two opening probes at `x = 0` and `x = 1` included.
pub trait BracketSearch: Send + Sync {
    fn search(&self, f: &dyn Fn(f64) -> f64, budget: u32) -> SearchResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    BinarySubdivision,
    ReverseBinarySubdivision,
    LowFirstReverseBinarySubdivision,
    Scattered,
    #[default]
    Directed,
}

impl SearchMethod {
    pub fn strategy(&self) -> &'static dyn BracketSearch {
        match self {
            SearchMethod::BinarySubdivision => &BinarySubdivision,
            SearchMethod::ReverseBinarySubdivision => &ReverseBinarySubdivision,
            SearchMethod::LowFirstReverseBinarySubdivision => &LowFirstReverseBinarySubdivision,
            SearchMethod::Scattered => &ScatteredSearch,
            SearchMethod::Directed => &DirectedSearch,
        }
    }

    pub fn search(&self, f: &dyn Fn(f64) -> f64, budget: u32) -> SearchResult {
        self.strategy().search(f, budget)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Probe：計數並套用 t → x 轉換
// ─────────────────────────────────────────────────────────────────────────────

struct Probe<'a> {
    f: &'a dyn Fn(f64) -> f64,
    budget: u32,
    evaluations: u32,
}

impl<'a> Probe<'a> {
    fn new(f: &'a dyn Fn(f64) -> f64, budget: u32) -> Probe<'a> {
        Probe {
            f,
            budget,
            evaluations: 0,
        }
    }

    fn at(&mut self, t: f64) -> f64 {
        self.evaluations += 1;
        (self.f)(x_from_t(t))
    }

    fn within(&self, budget: u32) -> bool {
        self.evaluations < budget
    }

    fn has_budget(&self) -> bool {
        self.within(self.budget)
    }

    /// Samples `t = 1` (x = 0) and `t = 0.5` (x = 1) as far as the budget
    /// allows. Returns `true` when nothing non-negligible turned up; the
    /// caller's walk then finds the budget already spent if it was below 2.
    fn start_is_negligible(&mut self) -> bool {
        if !self.has_budget() {
            return true;
        }
        let fb = self.at(1.0);
        if !self.has_budget() {
            return is_negligible(fb);
        }
        let fc = self.at(0.5);
        is_negligible(fb) && is_negligible(fc)
    }

    fn found(&self, a: f64, b: f64) -> SearchResult {
        SearchResult::Found(Bracket {
            a,
            b,
            evaluations: self.evaluations,
        })
    }

    /// The half of `[0, 1]` centred on `c`, clipped to the domain.
    fn found_around(&self, c: f64) -> SearchResult {
        if c < 0.5 {
            self.found(0.0, 2.0 * c)
        } else {
            self.found(2.0 * c - 1.0, 1.0)
        }
    }

    fn not_found(&self) -> SearchResult {
        SearchResult::NotFound {
            evaluations: self.evaluations,
        }
    }
}

fn ratio(i: u64, intervals: u64) -> f64 {
    i as f64 / intervals as f64
}

// ─────────────────────────────────────────────────────────────────────────────
// Subdivision searches
// ─────────────────────────────────────────────────────────────────────────────

/// Doubles the number of intervals and probes every new (odd) midpoint,
/// walking from `t = 0` towards `t = 1`.
pub struct BinarySubdivision;

impl BracketSearch for BinarySubdivision {
    fn search(&self, f: &dyn Fn(f64) -> f64, budget: u32) -> SearchResult {
        let mut probe = Probe::new(f, budget);
        if !probe.start_is_negligible() {
            return probe.found(0.0, 1.0);
        }

        let mut intervals: u64 = 4;
        while probe.has_budget() && intervals <= MAX_INTERVALS {
            for i in (1..intervals).step_by(2) {
                if !probe.has_budget() {
                    break;
                }
                if !is_negligible(probe.at(ratio(i, intervals))) {
                    return probe.found(ratio(i - 1, intervals), ratio(i + 1, intervals));
                }
            }
            intervals *= 2;
        }
        probe.not_found()
    }
}

/// Same as [`BinarySubdivision`] but walks from `t = 1` (x = 0) towards
/// `t = 0`, which favours integrands concentrated at small `x`.
pub struct ReverseBinarySubdivision;

impl BracketSearch for ReverseBinarySubdivision {
    fn search(&self, f: &dyn Fn(f64) -> f64, budget: u32) -> SearchResult {
        let mut probe = Probe::new(f, budget);
        if !probe.start_is_negligible() {
            return probe.found(0.0, 1.0);
        }

        let mut intervals: u64 = 4;
        while probe.has_budget() && intervals <= MAX_INTERVALS {
            for i in (1..intervals).step_by(2) {
                if !probe.has_budget() {
                    break;
                }
                if !is_negligible(probe.at(1.0 - ratio(i, intervals))) {
                    return probe.found(
                        1.0 - ratio(i + 1, intervals),
                        1.0 - ratio(i - 1, intervals),
                    );
                }
            }
            intervals *= 2;
        }
        probe.not_found()
    }
}

/// Reverse subdivision that spends the first half of the budget on the upper
/// half of `[0, 1]` (x < 1) at every doubling level, and only then goes back
/// and walks the lower half.
pub struct LowFirstReverseBinarySubdivision;

impl LowFirstReverseBinarySubdivision {
    fn walk(
        probe: &mut Probe<'_>,
        budget: u32,
        odd_range: impl Fn(u64) -> std::ops::Range<u64>,
    ) -> Option<SearchResult> {
        let mut intervals: u64 = 4;
        while probe.within(budget) && intervals <= MAX_INTERVALS {
            for i in odd_range(intervals).step_by(2) {
                if !probe.within(budget) {
                    break;
                }
                if !is_negligible(probe.at(1.0 - ratio(i, intervals))) {
                    return Some(probe.found(
                        1.0 - ratio(i + 1, intervals),
                        1.0 - ratio(i - 1, intervals),
                    ));
                }
            }
            intervals *= 2;
        }
        None
    }
}

impl BracketSearch for LowFirstReverseBinarySubdivision {
    fn search(&self, f: &dyn Fn(f64) -> f64, budget: u32) -> SearchResult {
        let mut probe = Probe::new(f, budget);
        if !probe.start_is_negligible() {
            return probe.found(0.0, 1.0);
        }

        let low_half = Self::walk(&mut probe, budget / 2, |intervals| 1..intervals / 2);
        if let Some(result) = low_half {
            return result;
        }
        let high_half = Self::walk(&mut probe, budget, |intervals| intervals / 2 + 1..intervals);
        high_half.unwrap_or_else(|| probe.not_found())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scattered / directed searches
// ─────────────────────────────────────────────────────────────────────────────

/// Walks `t = 1 - i/n` for `i = i0, i0 + p, i0 + 3p, i0 + 7p, ...` with a base
/// stride `p` that grows at every doubling of `n`, so each level lands on
/// midpoints earlier levels skipped. Returns the first `(t, f)` accepted by
/// `hit`.
fn scattered_walk(probe: &mut Probe<'_>, hit: impl Fn(f64) -> bool) -> Option<(f64, f64)> {
    let mut init_intervals: u64 = 4;
    let mut intervals = init_intervals;
    let mut init_i: u64 = 1;
    let mut k: u64 = 0;

    while probe.has_budget() {
        let mut i = init_i;
        let c = 1.0 - ratio(i, intervals);
        let fc = probe.at(c);
        if hit(fc) {
            return Some((c, fc));
        }

        let mut stride = 2 + 2 * k;
        k += 2;
        i += stride;
        while i < intervals && probe.has_budget() {
            let c = 1.0 - ratio(i, intervals);
            let fc = probe.at(c);
            if hit(fc) {
                return Some((c, fc));
            }
            stride *= 2;
            i += stride;
        }

        intervals *= 2;
        if intervals > MAX_INTERVALS {
            // Out of resolution: restart from a different odd offset.
            init_i += 2;
            if init_i >= init_intervals {
                init_intervals *= 2;
            }
            intervals = init_intervals;
            k = 0;
        }
    }
    None
}

pub struct ScatteredSearch;

impl BracketSearch for ScatteredSearch {
    fn search(&self, f: &dyn Fn(f64) -> f64, budget: u32) -> SearchResult {
        let mut probe = Probe::new(f, budget);
        if !probe.start_is_negligible() {
            return probe.found(0.0, 1.0);
        }

        match scattered_walk(&mut probe, |y| !is_negligible(y)) {
            Some((c, _)) => probe.found_around(c),
            None => probe.not_found(),
        }
    }
}

/// Scattered walk that stops at the first sample that is not exactly zero,
/// then, if that sample is still below epsilon, bisects towards the larger of
/// two interior probes until something non-negligible turns up (or the
/// bracket collapses).
pub struct DirectedSearch;

impl BracketSearch for DirectedSearch {
    fn search(&self, f: &dyn Fn(f64) -> f64, budget: u32) -> SearchResult {
        let mut probe = Probe::new(f, budget);
        if !probe.start_is_negligible() {
            return probe.found_around(0.5);
        }

        let Some((mut c, mut fc)) = scattered_walk(&mut probe, |y| y != 0.0) else {
            return probe.not_found();
        };

        let (mut a, mut b) = if c < 0.5 { (0.0, 2.0 * c) } else { (2.0 * c - 1.0, 1.0) };
        while is_negligible(fc) && probe.has_budget() && b - a > f64::EPSILON {
            let d = (a + c) / 2.0;
            let fd = probe.at(d);
            if !is_negligible(fd) {
                c = d;
                break;
            } else if fd <= fc {
                a = d;
            } else {
                b = c;
                c = d;
                fc = fd;
            }

            if !probe.has_budget() {
                break;
            }

            let e = (c + b) / 2.0;
            let fe = probe.at(e);
            if !is_negligible(fe) {
                c = e;
                break;
            } else if fe < fc {
                b = e;
            } else {
                a = c;
                c = e;
                fc = fe;
            }
        }

        probe.found_around(c)
    }
}
