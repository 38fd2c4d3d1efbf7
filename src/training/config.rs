//! Training configuration
//!
//! Settings for the adversarial SRFR training loop: batch geometry, class
//! counts, progress cadence, both optimizers and the learning rate schedule.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::training::loss::LossConfig;

/// Settings for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Global batch size, used for `samples_seen` in progress records
    pub batch_size: usize,
    /// Emit a progress record every this many steps
    pub log_every_steps: usize,
    /// Identity classes in the synthetic dataset
    pub num_classes_synthetic: usize,
    /// Identity classes in the natural dataset, when joint training is used
    pub num_classes_natural: Option<usize>,
    /// Optimizer for the SRFR model
    pub srfr_optimizer: OptimizerConfig,
    /// Optimizer for the discriminator
    pub discriminator_optimizer: OptimizerConfig,
    /// Learning rate schedule applied to both optimizers
    pub scheduler: SchedulerConfig,
    /// Loss weights and margin settings
    pub loss: LossConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            log_every_steps: 200,
            num_classes_synthetic: 9294,
            num_classes_natural: None,
            srfr_optimizer: OptimizerConfig::default(),
            discriminator_optimizer: OptimizerConfig::default(),
            scheduler: SchedulerConfig::default(),
            loss: LossConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }
        if self.log_every_steps == 0 {
            return Err(Error::config("log_every_steps must be > 0"));
        }
        if self.num_classes_synthetic == 0 {
            return Err(Error::config("num_classes_synthetic must be > 0"));
        }
        if self.num_classes_natural == Some(0) {
            return Err(Error::config("num_classes_natural must be > 0 when set"));
        }
        self.srfr_optimizer.validate()?;
        self.discriminator_optimizer.validate()?;
        self.scheduler.validate()?;
        self.loss.validate()?;
        Ok(())
    }
}

/// Optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Optimizer family
    pub optimizer_type: OptimizerType,
    /// Initial learning rate
    pub learning_rate: f64,
    /// First moment decay
    pub beta1: f64,
    /// Second moment decay
    pub beta2: f64,
    /// Denominator epsilon
    pub epsilon: f64,
    /// Decoupled weight decay
    pub weight_decay: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            optimizer_type: OptimizerType::AdamW,
            learning_rate: 5e-4,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            weight_decay: 0.0,
        }
    }
}

impl OptimizerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(Error::config("learning_rate must be > 0"));
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(Error::config("beta1 and beta2 must lie in [0, 1)"));
        }
        if self.weight_decay < 0.0 {
            return Err(Error::config("weight_decay must be >= 0"));
        }
        Ok(())
    }
}

/// Supported optimizer families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerType {
    /// Adam with decoupled weight decay
    AdamW,
    /// Plain stochastic gradient descent
    Sgd,
}

/// Learning rate schedule, stepped once per epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerConfig {
    /// Keep the initial rate
    Constant,
    /// Multiply the rate by `factor` every `step_epochs` epochs
    StepDecay {
        /// Epoch period of the decay
        step_epochs: usize,
        /// Multiplicative factor
        factor: f64,
    },
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::StepDecay {
            step_epochs: 20,
            factor: 0.1,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Constant => Ok(()),
            Self::StepDecay { step_epochs, factor } => {
                if *step_epochs == 0 {
                    return Err(Error::config("step_epochs must be > 0"));
                }
                if !(*factor > 0.0) {
                    return Err(Error::config("decay factor must be > 0"));
                }
                Ok(())
            }
        }
    }
}
