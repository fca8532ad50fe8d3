use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize, de};

use crate::configurationerror::ConfigurationError;
use crate::integration::adaptivequadrature::BracketFailurePolicy;
use crate::integration::bracketsearch::SearchMethod;
use crate::integration::integrationcontext::IntegrationContext;
use crate::integration::integrationsettings::SettingsError;

/// Integration defaults as read from a JSON document. Every field is
/// optional; absent fields leave the context untouched.
///
/// ```json
/// {
///     "tolerance": 1e-8,
///     "max_evals": 4096,
///     "search_method": "scattered",
///     "bracket_evals": 256,
///     "bracket_failure_policy": "fail"
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    pub tolerance: Option<f64>,
    pub max_evals: Option<u32>,
    pub search_method: Option<SearchMethod>,
    pub bracket_evals: Option<u32>,
    pub bracket_failure_policy: Option<BracketFailurePolicy>,
}

impl Configuration {
    pub fn from_reader<P: AsRef<Path>>(file_path: P) -> Result<Configuration, ConfigurationError> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);
        let configuration: Configuration = serde_json::from_reader(reader)?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn from_json(json_value: serde_json::Value) -> Result<Configuration, ConfigurationError> {
        if !json_value.is_object() {
            return Err(ConfigurationError::json_invalid_type(
                de::Unexpected::Other("non-object value"),
                &"a configuration object",
            ));
        }
        let configuration: Configuration = serde_json::from_value(json_value)?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Pushes every present field into `context`. Values are validated up
    /// front, so a rejected document changes nothing.
    pub fn apply(&self, context: &IntegrationContext) -> Result<(), ConfigurationError> {
        self.validate()?;
        if let Some(tolerance) = self.tolerance {
            context.set_tolerance(tolerance)?;
        }
        if let Some(max_evals) = self.max_evals {
            context.set_max_evals(max_evals)?;
        }
        if let Some(method) = self.search_method {
            context.set_search_method(method);
        }
        if let Some(bracket_evals) = self.bracket_evals {
            context.set_bracket_evals(bracket_evals);
        }
        if let Some(policy) = self.bracket_failure_policy {
            context.set_bracket_failure_policy(policy);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if let Some(tolerance) = self.tolerance {
            SettingsError::check_tolerance(tolerance)?;
        }
        if let Some(max_evals) = self.max_evals {
            SettingsError::check_max_evals(max_evals)?;
        }
        Ok(())
    }
}
