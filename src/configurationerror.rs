use serde::de::{self, Error as _};
use thiserror::Error;

use crate::integration::integrationsettings::SettingsError;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("can't read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("can't parse configuration: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl ConfigurationError {
    pub fn json_invalid_type(unexp: de::Unexpected, exp: &dyn de::Expected) -> ConfigurationError {
        ConfigurationError::JsonParse(serde_json::Error::invalid_type(unexp, exp))
    }
}
