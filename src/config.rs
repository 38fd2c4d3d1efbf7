//! Configuration structures for the SRFR system

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::training::TrainingConfig;

/// Main configuration for training and validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Training orchestration settings
    #[serde(default)]
    pub training: TrainingConfig,
    /// Pair-verification settings
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Layout of the records handed to the training loop
    #[serde(default)]
    pub dataset_shape: DatasetShape,
}

impl Config {
    /// Load configuration from a YAML (`.yaml`/`.yml`) or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration, format chosen by extension like [`Config::from_file`]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => serde_json::to_string_pretty(self)?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.validation.validate()?;
        Ok(())
    }
}

/// Settings for the pair-verification engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of contiguous folds for threshold selection
    pub num_folds: usize,
    /// Threshold step of the ROC sweep
    pub roc_threshold_step: f64,
    /// Threshold step of the validation-rate sweep
    pub val_threshold_step: f64,
    /// Upper bound (exclusive) of both sweeps
    pub max_threshold: f64,
    /// False accept rate the validation rate is reported at
    pub far_target: f64,
    /// Value written into embeddings that summed to all zeros
    pub degenerate_fill: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            num_folds: 10,
            roc_threshold_step: 0.01,
            val_threshold_step: 0.001,
            max_threshold: 4.0,
            far_target: 1e-3,
            degenerate_fill: 1e-7,
        }
    }
}

impl ValidationConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_folds < 2 {
            return Err(Error::config("Validation needs at least 2 folds"));
        }
        if self.roc_threshold_step <= 0.0 || self.val_threshold_step <= 0.0 {
            return Err(Error::config("Threshold steps must be > 0"));
        }
        if self.max_threshold <= 0.0 {
            return Err(Error::config("max_threshold must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.far_target) {
            return Err(Error::config("far_target must lie in [0, 1]"));
        }
        if self.degenerate_fill == 0.0 || !self.degenerate_fill.is_finite() {
            return Err(Error::config("degenerate_fill must be finite and non-zero"));
        }
        Ok(())
    }
}

/// Record layout produced by the dataset layer, fixed once at construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetShape {
    /// `(low_res, high_res, class_id)`
    #[default]
    ImageImageClass,
    /// `(low_res, high_res, class_id, sample_id)`
    ImageImageClassSample,
}

impl DatasetShape {
    /// Whether records carry a sample identifier
    pub fn has_sample_ids(self) -> bool {
        matches!(self, Self::ImageImageClassSample)
    }
}
