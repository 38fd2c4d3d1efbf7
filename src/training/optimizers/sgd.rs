//! Plain stochastic gradient descent
//!
//! Wraps `candle_nn::SGD`; weight decay, when configured, is applied as a
//! decoupled shrink of each variable after the gradient update.

use candle_core::Var;
use candle_nn::Optimizer as _;

use super::Optimizer;
use crate::error::Result;
use crate::training::tape::ModelGradients;

/// SGD optimizer
pub struct SGDOptimizer {
    inner: candle_nn::SGD,
    vars: Vec<Var>,
    weight_decay: f64,
    step_count: usize,
}

impl SGDOptimizer {
    /// Create a new SGD optimizer over `vars`
    pub fn new(vars: Vec<Var>, learning_rate: f64, weight_decay: f64) -> Result<Self> {
        let inner = candle_nn::SGD::new(vars.clone(), learning_rate)?;
        Ok(Self {
            inner,
            vars,
            weight_decay,
            step_count: 0,
        })
    }

    fn apply_weight_decay(&self) -> Result<()> {
        let shrink = 1.0 - self.inner.learning_rate() * self.weight_decay;
        for var in &self.vars {
            var.set(&var.as_tensor().affine(shrink, 0.0)?)?;
        }
        Ok(())
    }
}

impl Optimizer for SGDOptimizer {
    fn name(&self) -> &str {
        "sgd"
    }

    fn apply_gradients(&mut self, gradients: &ModelGradients) -> Result<()> {
        gradients.ensure_complete(&self.vars)?;
        self.inner.step(gradients.store())?;
        if self.weight_decay > 0.0 {
            self.apply_weight_decay()?;
        }
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
