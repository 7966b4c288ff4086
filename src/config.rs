//! Top-level configuration.
//!
//! Every section has a working default, so an empty JSON object is a valid
//! configuration. Durations are in milliseconds.

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, VantageResult};
use crate::fabricator::FabricatorConfig;
use crate::operation::ControllerConfig;
use crate::reality::ObserverConfig;

/// Configuration for an observer, fabricator and controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VantageConfig {
    #[allow(missing_docs)]
    pub observer: ObserverConfig,
    #[allow(missing_docs)]
    pub fabricator: FabricatorConfig,
    #[allow(missing_docs)]
    pub controller: ControllerConfig,
}

impl VantageConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// `InvalidConfig` if the document does not parse, or any section's
    /// validation error.
    pub fn from_json_str(json: &str) -> VantageResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    /// The first section's validation error.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.observer.validate()?;
        self.fabricator.validate()?;
        self.controller.validate()
    }
}
