//! Whole-pipeline configuration.
//!
//! Every section has defaults, so a JSON document only needs the fields it
//! changes:
//!
//! ```json
//! { "bank": { "sample_fraction": 0.05, "seed": 7 },
//!   "calibration": { "policy": { "policy": "metric_optimal", "metric": "f1" } } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationConfig;
use crate::error::Result;
use crate::feature::{ConvBackboneConfig, ExtractorConfig};
use crate::memory::BankConfig;

/// Settings for backbone, extraction, bank construction and calibration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchCoreConfig {
    pub backbone: ConvBackboneConfig,
    pub extractor: ExtractorConfig,
    pub bank: BankConfig,
    pub calibration: CalibrationConfig,
}

impl PatchCoreConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.backbone.validate()?;
        self.extractor.validate()?;
        self.bank.validate()?;
        self.calibration.validate()
    }
}
