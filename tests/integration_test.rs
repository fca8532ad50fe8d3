use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use serial_test::serial;

use riskcore::caching::memoizingcache::MemoizingCache;
use riskcore::integration::adaptivequadrature::{BracketFailurePolicy, IntegrationFailure};
use riskcore::integration::bracketsearch::SearchMethod;
use riskcore::integration::integrationcontext::{self, IntegrationContext};
use riskcore::integration::integrationsettings::SettingsError;

#[test]
fn exponential_decay_integrates_to_one() {
    let context = IntegrationContext::new();
    let result = context.integrate(&|x| (-x).exp());
    assert!(result.success());
    assert!((result.integral() - 1.0).abs() < 1e-5);
    assert!(result.evaluations() <= 1024);
    assert_eq!(result.value().map(|v| v.round()), Ok(1.0));
}

#[test]
fn search_methods_agree_when_mass_starts_at_origin() {
    let shifted = |x: f64| (-(x - 4.0) * (x - 4.0) / 2.0).exp() / (2.0 * PI).sqrt();
    let context = IntegrationContext::new();
    context.set_max_evals(8192).unwrap();
    for method in [SearchMethod::Directed, SearchMethod::Scattered] {
        context.set_search_method(method);
        let result = context.integrate(&shifted);
        assert!(result.success(), "{method:?} failed: {result:?}");
        // Mass of N(4, 1) on [0, ∞).
        assert!((result.integral() - 0.999_968_3).abs() < 1e-4, "{method:?}: {result:?}");
    }
}

#[test]
fn tiny_budget_reports_failure() {
    let context = IntegrationContext::new();
    context.set_max_evals(8).unwrap();
    let result = context.integrate(&|x| (-x).exp());
    assert!(!result.success());
    assert!(result.evaluations() <= 8);
    assert_eq!(result.value(), Err(IntegrationFailure::BudgetExceeded));
}

#[test]
fn zero_integrand_follows_the_context_policy() {
    let context = IntegrationContext::new();
    context.set_max_evals(128).unwrap();

    let zero = context.integrate(&|_| 0.0);
    assert!(zero.success());
    assert_eq!(zero.integral(), 0.0);
    assert_eq!(zero.failure(), Some(IntegrationFailure::BracketNotFound));

    context.set_bracket_failure_policy(BracketFailurePolicy::Fail);
    let failed = context.integrate(&|_| 0.0);
    assert!(!failed.success());
    assert!(failed.integral().is_nan());
    assert_eq!(failed.value(), Err(IntegrationFailure::BracketNotFound));
}

#[test]
fn per_call_settings_override_the_defaults() {
    let context = IntegrationContext::new();
    let tight = context.local_settings();
    tight.override_max_evals(8).unwrap();

    assert!(!context.integrate_with_settings(&|x| (-x).exp(), &tight).success());
    assert!(context.integrate(&|x| (-x).exp()).success());

    let report = context.stats().snapshot();
    assert_eq!(report.calls, 2);
    assert_eq!(report.successes, 1);
    assert_eq!(report.failures, 1);
}

#[test]
#[serial]
fn global_setters_invalidate_caches() {
    let context = IntegrationContext::global();
    context.reset();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let priced = MemoizingCache::new(
        move |rate: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            let rate = f64::from(*rate) / 100.0;
            integrationcontext::integrate(&|x| (-rate * x).exp()).integral()
        },
        "discount_mass",
        context.registry(),
    );

    let first = priced.get(50);
    assert!((first - 2.0).abs() < 1e-4);
    priced.get(50);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    context.set_tolerance(1e-3).unwrap();
    let second = priced.get(50);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!((second - 2.0).abs() < 1e-2);

    assert_eq!(context.set_tolerance(0.0), Err(SettingsError::InvalidTolerance(0.0)));
    priced.get(50);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    context.reset();
}

#[test]
#[serial]
fn global_entry_points_share_defaults() {
    let context = IntegrationContext::global();
    context.reset();
    context.set_max_evals(8).unwrap();

    let local = context.local_settings();
    assert!(!integrationcontext::integrate(&|x| (-x).exp()).success());
    assert!(!integrationcontext::integrate_with_settings(&|x| (-x).exp(), &local).success());

    local.override_max_evals(1024).unwrap();
    assert!(integrationcontext::integrate_with_settings(&|x| (-x).exp(), &local).success());

    context.reset();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn integration_is_linear(scale in 0.5f64..10.0, rate in 0.5f64..4.0) {
        let context = IntegrationContext::new();
        let f = move |x: f64| (-rate * x).exp();
        let g = move |x: f64| (-(x + 1.0) * (x + 1.0)).exp();

        let base = context.integrate(&f);
        let scaled = context.integrate(&move |x| scale * f(x));
        let other = context.integrate(&g);
        let sum = context.integrate(&move |x| f(x) + g(x));

        prop_assert!(base.success() && scaled.success() && other.success() && sum.success());
        prop_assert!((base.integral() - 1.0 / rate).abs() < 1e-4 / rate);
        prop_assert!((scaled.integral() - scale * base.integral()).abs() < 1e-4 * scale);
        prop_assert!((sum.integral() - base.integral() - other.integral()).abs() < 1e-4);
    }
}
