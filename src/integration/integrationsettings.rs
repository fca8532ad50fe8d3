use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

pub const TOLERANCE_DEFAULT: f64 = 1e-6;
pub const EVALUATIONS_DEFAULT: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SettingsError {
    #[error("can't set tolerance to {0}; must be > 0")]
    InvalidTolerance(f64),
    #[error("can't set max evaluations to {0}; must be > 0")]
    InvalidMaxEvals(u32),
}

impl SettingsError {
    pub fn check_tolerance(tolerance: f64) -> Result<f64, SettingsError> {
        // `!(x > 0)` also rejects NaN.
        if !(tolerance > 0.0) {
            Err(SettingsError::InvalidTolerance(tolerance))
        } else {
            Ok(tolerance)
        }
    }

    pub fn check_max_evals(max_evals: u32) -> Result<u32, SettingsError> {
        if max_evals == 0 {
            Err(SettingsError::InvalidMaxEvals(max_evals))
        } else {
            Ok(max_evals)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LocalValues {
    tolerance: Option<f64>,
    max_evals: Option<u32>,
}

/// Tolerance and evaluation budget for an integration call.
///
/// Each field is either pinned locally or left unspecified, in which case it
/// is looked up in the parent. The chain ends at a parentless root (usually
/// the defaults owned by an
/// [`IntegrationContext`](super::integrationcontext::IntegrationContext));
/// parents are fixed at construction, so the chain is always acyclic.
///
/// ```
/// use std::sync::Arc;
/// use riskcore::integration::integrationsettings::IntegrationSettings;
///
/// let root = Arc::new(IntegrationSettings::new_root());
/// let local = IntegrationSettings::with_parent(&root);
/// local.override_tolerance(1e-3).unwrap();
/// assert!(local.override_tolerance(-1.0).is_err());
/// assert_eq!(local.effective_tolerance(), 1e-3);
/// assert_eq!(root.effective_tolerance(), 1e-6);
/// ```
#[derive(Debug)]
pub struct IntegrationSettings {
    local: RwLock<LocalValues>,
    parent: Option<Arc<IntegrationSettings>>,
}

impl IntegrationSettings {
    /// A parentless settings object with every field specified.
    pub fn new_root() -> IntegrationSettings {
        IntegrationSettings {
            local: RwLock::new(LocalValues {
                tolerance: Some(TOLERANCE_DEFAULT),
                max_evals: Some(EVALUATIONS_DEFAULT),
            }),
            parent: None,
        }
    }

    /// A settings object that delegates every field to `parent` until it is
    /// overridden.
    pub fn with_parent(parent: &Arc<IntegrationSettings>) -> IntegrationSettings {
        IntegrationSettings {
            local: RwLock::new(LocalValues::default()),
            parent: Some(Arc::clone(parent)),
        }
    }

    pub fn effective_tolerance(&self) -> f64 {
        let mut settings = self;
        loop {
            let tolerance = settings.local.read().tolerance;
            match (tolerance, &settings.parent) {
                (Some(tolerance), _) => return tolerance,
                (None, Some(parent)) => settings = parent,
                (None, None) => return TOLERANCE_DEFAULT,
            }
        }
    }

    pub fn effective_max_evals(&self) -> u32 {
        let mut settings = self;
        loop {
            let max_evals = settings.local.read().max_evals;
            match (max_evals, &settings.parent) {
                (Some(max_evals), _) => return max_evals,
                (None, Some(parent)) => settings = parent,
                (None, None) => return EVALUATIONS_DEFAULT,
            }
        }
    }

    /// Pins the tolerance locally. Values that are not `> 0` are rejected and
    /// the previous setting is kept.
    pub fn override_tolerance(&self, tolerance: f64) -> Result<(), SettingsError> {
        let tolerance = SettingsError::check_tolerance(tolerance)?;
        self.local.write().tolerance = Some(tolerance);
        Ok(())
    }

    pub fn override_max_evals(&self, max_evals: u32) -> Result<(), SettingsError> {
        let max_evals = SettingsError::check_max_evals(max_evals)?;
        self.local.write().max_evals = Some(max_evals);
        Ok(())
    }

    /// Re-enables delegation for the tolerance. On a root this restores
    /// [`TOLERANCE_DEFAULT`].
    pub fn use_default_tolerance(&self) {
        self.local.write().tolerance = None;
    }

    /// Re-enables delegation for the evaluation budget. On a root this
    /// restores [`EVALUATIONS_DEFAULT`].
    pub fn use_default_max_evals(&self) {
        self.local.write().max_evals = None;
    }

    pub fn has_local_tolerance(&self) -> bool {
        self.local.read().tolerance.is_some()
    }

    pub fn has_local_max_evals(&self) -> bool {
        self.local.read().max_evals.is_some()
    }
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        IntegrationSettings::new_root()
    }
}
