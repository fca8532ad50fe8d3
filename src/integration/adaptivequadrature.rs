use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bracketsearch::{Bracket, SearchMethod, SearchResult, x_from_t};
use super::integrationsettings::IntegrationSettings;
use super::integrationstats::IntegrationStats;

// ─────────────────────────────────────────────────────────────────────────────
// Result types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationFailure {
    #[error("bracketing search found no non-negligible sample")]
    BracketNotFound,
    #[error("evaluation budget exceeded before convergence")]
    BudgetExceeded,
    #[error("integrand returned NaN")]
    NanSample,
}

/// What to do when the bracketing search comes back empty-handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketFailurePolicy {
    /// Report `{0, success = true}`.
    #[default]
    TreatAsZero,
    /// Report `{NaN, success = false}`.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntegrationResult {
    integral: f64,
    success: bool,
    evaluations: u32,
    failure: Option<IntegrationFailure>,
}

impl IntegrationResult {
    fn converged(integral: f64, evaluations: u32) -> IntegrationResult {
        IntegrationResult {
            integral,
            success: true,
            evaluations,
            failure: None,
        }
    }

    fn failed(failure: IntegrationFailure, evaluations: u32) -> IntegrationResult {
        IntegrationResult {
            integral: f64::NAN,
            success: false,
            evaluations,
            failure: Some(failure),
        }
    }

    fn bracket_not_found(policy: BracketFailurePolicy, evaluations: u32) -> IntegrationResult {
        match policy {
            BracketFailurePolicy::TreatAsZero => IntegrationResult {
                integral: 0.0,
                success: true,
                evaluations,
                failure: Some(IntegrationFailure::BracketNotFound),
            },
            BracketFailurePolicy::Fail => {
                Self::failed(IntegrationFailure::BracketNotFound, evaluations)
            }
        }
    }

    /// `NaN` whenever `success` is `false`.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Integrand evaluations used, bracketing search included.
    pub fn evaluations(&self) -> u32 {
        self.evaluations
    }

    /// Why the integration did not converge normally. A bracket failure under
    /// [`BracketFailurePolicy::TreatAsZero`] is reported here even though
    /// `success` is `true`.
    pub fn failure(&self) -> Option<IntegrationFailure> {
        self.failure
    }

    /// The integral, or the failure that makes it unusable.
    pub fn value(&self) -> Result<f64, IntegrationFailure> {
        match (self.success, self.failure) {
            (false, Some(failure)) => Err(failure),
            _ => Ok(self.integral),
        }
    }
}

/// Engine knobs shared by every call that goes through one context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QuadratureOptions {
    pub method: SearchMethod,
    /// Evaluation budget for the bracketing search; 0 means "the call's
    /// effective `max_evals`".
    pub bracket_evals: u32,
    pub bracket_failure_policy: BracketFailurePolicy,
}

impl QuadratureOptions {
    pub fn bracket_budget(&self, max_evals: u32) -> u32 {
        if self.bracket_evals == 0 {
            max_evals
        } else {
            self.bracket_evals
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Region stack
// ─────────────────────────────────────────────────────────────────────────────

fn simpson(a: f64, b: f64, fa: f64, fc: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fc + fb)
}

/// One pending interval `[a, b]` with midpoint `c`, its three samples and its
/// Simpson estimate `r`.
#[derive(Debug, Clone, Copy)]
struct Region {
    a: f64,
    c: f64,
    b: f64,
    fa: f64,
    fc: f64,
    fb: f64,
    r: f64,
}

impl Region {
    fn new(a: f64, b: f64, fa: f64, fc: f64, fb: f64) -> Region {
        Region {
            a,
            c: (a + b) / 2.0,
            b,
            fa,
            fc,
            fb,
            r: simpson(a, b, fa, fc, fb),
        }
    }

    /// Splits at `c`, sampling only the two new midpoints.
    fn split(&self, sampler: &mut Sampler<'_>) -> Result<(Region, Region), IntegrationFailure> {
        let fd = sampler.sample((self.a + self.c) / 2.0)?;
        let fe = sampler.sample((self.c + self.b) / 2.0)?;
        Ok((
            Region::new(self.a, self.c, self.fa, fd, self.fc),
            Region::new(self.c, self.b, self.fc, fe, self.fb),
        ))
    }
}

/// Evaluates the Jacobian-corrected integrand `g(t) = f(1/t - 1) / t²`.
/// At `t = 0` the sample is `f(∞)` itself.
struct Sampler<'a> {
    f: &'a dyn Fn(f64) -> f64,
    evaluations: u32,
}

impl Sampler<'_> {
    fn sample(&mut self, t: f64) -> Result<f64, IntegrationFailure> {
        self.evaluations = self.evaluations.saturating_add(1);
        let y = (self.f)(x_from_t(t));
        let g = if t == 0.0 { y } else { y / (t * t) };
        if g.is_nan() {
            Err(IntegrationFailure::NanSample)
        } else {
            Ok(g)
        }
    }
}

fn refine(
    sampler: &mut Sampler<'_>,
    bracket: &Bracket,
    tolerance: f64,
    max_evals: u32,
) -> Result<f64, IntegrationFailure> {
    if sampler.evaluations.saturating_add(3) > max_evals {
        return Err(IntegrationFailure::BudgetExceeded);
    }
    let (a, b) = (bracket.a(), bracket.b());
    let fa = sampler.sample(a)?;
    let fb = sampler.sample(b)?;
    let fc = sampler.sample((a + b) / 2.0)?;

    let mut stack = vec![Region::new(a, b, fa, fc, fb)];
    let mut integral = 0.0;

    while let Some(region) = stack.pop() {
        if sampler.evaluations.saturating_add(2) > max_evals {
            return Err(IntegrationFailure::BudgetExceeded);
        }

        let (left, right) = region.split(sampler)?;
        let q1 = region.r;
        let q2 = left.r + right.r;
        let abserr = (q2 - q1).abs();

        if abserr <= (tolerance * q2).abs() || abserr <= (tolerance * integral).abs() {
            integral += q2 + (q2 - q1) / 15.0;
        } else if left.r.abs() > right.r.abs() {
            // Larger half on top: it is refined first.
            stack.push(right);
            stack.push(left);
        } else {
            stack.push(left);
            stack.push(right);
        }
    }

    Ok(integral)
}

/// Integrates `f` over `[0, ∞)`.
///
/// The configured bracketing search first locates a sub-interval of
/// `t ∈ [0, 1]` (`x = 1/t - 1`) where `f` is non-negligible; adaptive Simpson
/// refinement with Richardson correction then runs from that bracket until
/// every region meets `tolerance` or the evaluation budget runs out.
///
/// Failures do not panic. A NaN sample aborts at once; running out of budget
/// yields `{NaN, false}`; an empty bracketing search follows
/// `options.bracket_failure_policy`.
pub fn integrate_with(
    f: &dyn Fn(f64) -> f64,
    settings: &IntegrationSettings,
    options: &QuadratureOptions,
    stats: &IntegrationStats,
) -> IntegrationResult {
    stats.record_call();

    let tolerance = settings.effective_tolerance();
    let max_evals = settings.effective_max_evals();
    let bracket_budget = options.bracket_budget(max_evals);

    let search = options.method.search(f, bracket_budget);
    let bracket_evaluations = search.evaluations();
    stats.record_search(bracket_evaluations, bracket_evaluations < bracket_budget);

    let bracket = match search {
        SearchResult::Found(bracket) => {
            stats.record_bracket(bracket.midpoint());
            bracket
        }
        SearchResult::NotFound { evaluations } => {
            stats.record_bracket_failure();
            tracing::warn!(
                method = ?options.method,
                evaluations,
                policy = ?options.bracket_failure_policy,
                "bracketing search found nothing"
            );
            return IntegrationResult::bracket_not_found(options.bracket_failure_policy, evaluations);
        }
    };

    let mut sampler = Sampler {
        f,
        evaluations: bracket_evaluations,
    };
    let outcome = refine(&mut sampler, &bracket, tolerance, max_evals);
    let evaluations = sampler.evaluations;
    let quadrature_evaluations = evaluations - bracket_evaluations;

    match outcome {
        Ok(integral) => {
            stats.record_finished(quadrature_evaluations, evaluations, true);
            tracing::debug!(integral, evaluations, "integration converged");
            IntegrationResult::converged(integral, evaluations)
        }
        Err(IntegrationFailure::NanSample) => {
            stats.record_nan(quadrature_evaluations, evaluations);
            tracing::error!(
                a = bracket.a(),
                b = bracket.b(),
                evaluations,
                "integrand sample is NaN"
            );
            IntegrationResult::failed(IntegrationFailure::NanSample, evaluations)
        }
        Err(failure) => {
            stats.record_finished(quadrature_evaluations, evaluations, false);
            tracing::debug!(tolerance, max_evals, evaluations, "integration did not converge");
            IntegrationResult::failed(failure, evaluations)
        }
    }
}
