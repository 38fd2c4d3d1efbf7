//! AdamW optimizer
//!
//! Thin wrapper over `candle_nn::AdamW`. With zero weight decay this is the
//! plain Adam update the SRFR recipe trains with.

use candle_core::Var;
use candle_nn::{Optimizer as _, ParamsAdamW};

use super::Optimizer;
use crate::error::Result;
use crate::training::tape::ModelGradients;

/// AdamW optimizer with decoupled weight decay
pub struct AdamWOptimizer {
    inner: candle_nn::AdamW,
    vars: Vec<Var>,
    step_count: usize,
}

impl AdamWOptimizer {
    /// Create a new AdamW optimizer over `vars`
    pub fn new(
        vars: Vec<Var>,
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
        weight_decay: f64,
    ) -> Result<Self> {
        let params = ParamsAdamW {
            lr: learning_rate,
            beta1,
            beta2,
            eps: epsilon,
            weight_decay,
        };
        let inner = candle_nn::AdamW::new(vars.clone(), params)?;
        Ok(Self {
            inner,
            vars,
            step_count: 0,
        })
    }

    /// Hyperparameters in use
    pub fn params(&self) -> &ParamsAdamW {
        self.inner.params()
    }
}

impl Optimizer for AdamWOptimizer {
    fn name(&self) -> &str {
        "adamw"
    }

    fn apply_gradients(&mut self, gradients: &ModelGradients) -> Result<()> {
        gradients.ensure_complete(&self.vars)?;
        self.inner.step(gradients.store())?;
        self.step_count += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.inner.learning_rate()
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.inner.set_learning_rate(lr);
    }

    fn variables(&self) -> &[Var] {
        &self.vars
    }

    fn step_count(&self) -> usize {
        self.step_count
    }
}
