use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use super::adaptivequadrature::{
    BracketFailurePolicy, IntegrationResult, QuadratureOptions, integrate_with,
};
use super::bracketsearch::SearchMethod;
use super::integrationsettings::{IntegrationSettings, SettingsError};
use super::integrationstats::IntegrationStats;
use crate::caching::cacheregistry::CacheRegistry;

static GLOBAL_CONTEXT: LazyLock<IntegrationContext> = LazyLock::new(IntegrationContext::new);

/// Everything a calculation shares: the default integration settings, the
/// registry of caches whose contents depend on them, the engine options and
/// the diagnostics counters.
///
/// Every successful change to the defaults or to the engine options clears
/// all caches registered with [`registry`](Self::registry) before returning,
/// since their cached results were computed under the old configuration.
///
/// Calculations normally receive a context explicitly; [`global`](Self::global)
/// is a lazily created process-wide instance for the convenience functions
/// [`integrate`] and [`integrate_with_settings`].
pub struct IntegrationContext {
    defaults: Arc<IntegrationSettings>,
    registry: Arc<CacheRegistry>,
    options: RwLock<QuadratureOptions>,
    stats: IntegrationStats,
}

impl IntegrationContext {
    pub fn new() -> IntegrationContext {
        IntegrationContext {
            defaults: Arc::new(IntegrationSettings::new_root()),
            registry: Arc::new(CacheRegistry::new()),
            options: RwLock::new(QuadratureOptions::default()),
            stats: IntegrationStats::new(),
        }
    }

    pub fn global() -> &'static IntegrationContext {
        &GLOBAL_CONTEXT
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn default_tolerance(&self) -> f64 {
        self.defaults.effective_tolerance()
    }

    pub fn default_max_evals(&self) -> u32 {
        self.defaults.effective_max_evals()
    }

    /// Fresh per-call settings that delegate to this context's defaults.
    ///
    /// The defaults themselves are never handed out; they change only
    /// through the setters below, which also clear the registered caches.
    pub fn local_settings(&self) -> IntegrationSettings {
        IntegrationSettings::with_parent(&self.defaults)
    }

    pub fn options(&self) -> QuadratureOptions {
        *self.options.read()
    }

    pub fn stats(&self) -> &IntegrationStats {
        &self.stats
    }

    pub fn set_tolerance(&self, tolerance: f64) -> Result<(), SettingsError> {
        self.defaults
            .override_tolerance(tolerance)
            .inspect_err(|error| tracing::warn!(%error, "rejected default tolerance"))?;
        tracing::info!(tolerance, "default tolerance changed");
        self.registry.clear_all();
        Ok(())
    }

    pub fn set_max_evals(&self, max_evals: u32) -> Result<(), SettingsError> {
        self.defaults
            .override_max_evals(max_evals)
            .inspect_err(|error| tracing::warn!(%error, "rejected default max evaluations"))?;
        tracing::info!(max_evals, "default max evaluations changed");
        self.registry.clear_all();
        Ok(())
    }

    pub fn set_search_method(&self, method: SearchMethod) {
        self.update_options(|options| options.method = method);
    }

    /// Bracketing sub-budget; 0 lets the search use the whole `max_evals`.
    pub fn set_bracket_evals(&self, bracket_evals: u32) {
        self.update_options(|options| options.bracket_evals = bracket_evals);
    }

    pub fn set_bracket_failure_policy(&self, policy: BracketFailurePolicy) {
        self.update_options(|options| options.bracket_failure_policy = policy);
    }

    /// Restores the built-in tolerance, evaluation budget and engine options.
    pub fn reset(&self) {
        self.defaults.use_default_tolerance();
        self.defaults.use_default_max_evals();
        *self.options.write() = QuadratureOptions::default();
        tracing::info!("integration settings reset to defaults");
        self.registry.clear_all();
    }

    /// Integrates `f` over `[0, ∞)` with this context's defaults.
    pub fn integrate(&self, f: &dyn Fn(f64) -> f64) -> IntegrationResult {
        self.integrate_with_settings(f, &self.defaults)
    }

    /// Integrates `f` over `[0, ∞)` with explicit settings (normally a chain
    /// started from [`local_settings`](Self::local_settings)).
    pub fn integrate_with_settings(
        &self,
        f: &dyn Fn(f64) -> f64,
        settings: &IntegrationSettings,
    ) -> IntegrationResult {
        let options = self.options();
        integrate_with(f, settings, &options, &self.stats)
    }

    fn update_options(&self, update: impl FnOnce(&mut QuadratureOptions)) {
        let options = {
            let mut options = self.options.write();
            update(&mut options);
            *options
        };
        tracing::info!(?options, "quadrature options changed");
        self.registry.clear_all();
    }
}

impl Default for IntegrationContext {
    fn default() -> Self {
        IntegrationContext::new()
    }
}

/// [`IntegrationContext::integrate`] on the process-wide context.
pub fn integrate(f: &dyn Fn(f64) -> f64) -> IntegrationResult {
    IntegrationContext::global().integrate(f)
}

/// [`IntegrationContext::integrate_with_settings`] on the process-wide context.
pub fn integrate_with_settings(
    f: &dyn Fn(f64) -> f64,
    settings: &IntegrationSettings,
) -> IntegrationResult {
    IntegrationContext::global().integrate_with_settings(f, settings)
}
