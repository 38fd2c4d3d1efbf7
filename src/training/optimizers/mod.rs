//! Optimizers and learning rate schedulers for SRFR training
//!
//! Each model in the adversarial step owns one optimizer. Optimizers consume
//! the [`ModelGradients`] produced by that model's tape and refuse gradient
//! sets that do not cover every variable they were built over.

pub mod adamw;
pub mod schedulers;
pub mod sgd;

pub use adamw::AdamWOptimizer;
pub use schedulers::{create_scheduler, ConstantScheduler, Scheduler, StepScheduler};
pub use sgd::SGDOptimizer;

use candle_core::Var;
use tracing::debug;

use crate::error::Result;
use crate::training::config::{OptimizerConfig, OptimizerType};
use crate::training::tape::ModelGradients;

/// Trait for optimizers
pub trait Optimizer: Send {
    /// Optimizer name
    fn name(&self) -> &str;

    /// Apply one update from `gradients`
    fn apply_gradients(&mut self, gradients: &ModelGradients) -> Result<()>;

    /// Current learning rate
    fn learning_rate(&self) -> f64;

    /// Set learning rate
    fn set_learning_rate(&mut self, lr: f64);

    /// Variables updated by this optimizer
    fn variables(&self) -> &[Var];

    /// Number of updates applied so far
    fn step_count(&self) -> usize;
}

/// Build the optimizer described by `config` over `vars`
pub fn create_optimizer(config: &OptimizerConfig, vars: Vec<Var>) -> Result<Box<dyn Optimizer>> {
    config.validate()?;
    debug!(
        optimizer = ?config.optimizer_type,
        lr = config.learning_rate,
        variables = vars.len(),
        "Creating optimizer"
    );
    let optimizer: Box<dyn Optimizer> = match config.optimizer_type {
        OptimizerType::AdamW => Box::new(AdamWOptimizer::new(
            vars,
            config.learning_rate,
            config.beta1,
            config.beta2,
            config.epsilon,
            config.weight_decay,
        )?),
        OptimizerType::Sgd => Box::new(SGDOptimizer::new(vars, config.learning_rate, config.weight_decay)?),
    };
    Ok(optimizer)
}
