//! Loss functions for SRFR training
//!
//! This module composes primitive tensor metrics into the losses that drive
//! joint super-resolution / face-recognition training.
//!
//! # Key Components
//!
//! - **Reconstruction**: perceptual distance in a frozen feature space and L1 pixel loss
//! - **Adversarial**: relativistic average generator and discriminator losses
//! - **Margin**: additive angular margin (ArcFace style) classification loss
//! - **Composition**: [`SrfrLoss`], the joint loss with optional metrics summaries
//! - **Utilities**: softmax, cross-entropies, distances and batch reductions
//!
//! # Usage
//!
//! ```rust,ignore
//! use srfr::training::loss::{LossConfig, SrfrLoss, RecognitionTerms};
//!
//! let loss = SrfrLoss::new(LossConfig::default())
//!     .with_feature_extractor(vgg)
//!     .with_metrics_sink(sink);
//!
//! let total = loss.joint_loss(&sr, &hr, &d_sr, &d_hr, synthetic, step, None)?;
//! let d_loss = loss.discriminator_loss(&d_sr, &d_hr)?;
//! ```

pub mod adversarial;
pub mod composition;
pub mod margin;
pub mod reconstruction;
pub mod utils;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the SRFR losses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Weight applied to perceptual and L1 terms, and to the SR loss in the joint sum
    pub weight: f64,
    /// Logit scale of the angular margin loss
    pub scale: f64,
    /// Additive angular margin, in radians
    pub margin: f64,
    /// Batch size the classification loss sum is divided by; the local batch when unset
    pub global_batch_size: Option<usize>,
    /// Probability clipping and division guard
    pub epsilon: f64,
    /// Squashing applied to relativistic score differences
    pub relativistic_activation: RelativisticActivation,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            weight: 0.1,
            scale: 64.0,
            margin: 0.5,
            global_batch_size: None,
            epsilon: 1e-7,
            relativistic_activation: RelativisticActivation::Sigmoid,
        }
    }
}

impl LossConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(Error::config("loss weight must be finite and >= 0"));
        }
        if !(self.scale > 0.0) {
            return Err(Error::config("margin loss scale must be > 0"));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(Error::config("angular margin must be finite and >= 0"));
        }
        if self.global_batch_size == Some(0) {
            return Err(Error::config("global_batch_size must be > 0 when set"));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 0.5) {
            return Err(Error::config("epsilon must lie in (0, 0.5)"));
        }
        Ok(())
    }
}

/// How relativistic score differences become probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativisticActivation {
    /// Element-wise logistic, equivalent to a softmax over `{difference, 0}`
    Sigmoid,
    /// Softmax across the batch row
    RowSoftmax,
}

/// Named loss terms of one training step
#[derive(Debug, Clone)]
pub struct LossBundle {
    /// Weighted perceptual distance
    pub perceptual: Tensor,
    /// Relativistic generator loss
    pub generator: Tensor,
    /// Weighted L1 pixel loss
    pub l1: Tensor,
    /// `perceptual + generator + l1`
    pub super_resolution: Tensor,
    /// Margin classification loss, summed over the recognition branches
    pub classification: Tensor,
    /// `classification + weight * super_resolution`
    pub total: Tensor,
}

/// Host-side copy of a [`LossBundle`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossScalars {
    /// Weighted perceptual distance
    pub perceptual: f64,
    /// Relativistic generator loss
    pub generator: f64,
    /// Weighted L1 pixel loss
    pub l1: f64,
    /// Super-resolution loss
    pub super_resolution: f64,
    /// Classification loss
    pub classification: f64,
    /// Joint total
    pub total: f64,
}

impl LossBundle {
    /// Read every term back to the host
    pub fn to_scalars(&self) -> Result<LossScalars> {
        Ok(LossScalars {
            perceptual: utils::to_f64(&self.perceptual)?,
            generator: utils::to_f64(&self.generator)?,
            l1: utils::to_f64(&self.l1)?,
            super_resolution: utils::to_f64(&self.super_resolution)?,
            classification: utils::to_f64(&self.classification)?,
            total: utils::to_f64(&self.total)?,
        })
    }
}

pub use adversarial::{discriminator_loss, generator_loss};
pub use composition::{RecognitionTerms, SrfrLoss};
pub use margin::margin_classification_loss;
pub use reconstruction::{l1_loss, perceptual_loss};
