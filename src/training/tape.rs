//! Differentiation scopes for the adversarial training step
//!
//! Each model gets its own [`GradientTape`]. A tape turns a loss into the
//! gradients of that model's trainable variables only, and refuses to hand
//! back a gradient set with a hole in it: a variable the loss does not reach
//! would otherwise silently stay untrained.

use std::fmt;

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use tracing::debug;

use crate::error::{Error, Result};

/// Which model a tape records for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeKind {
    /// SRFR model (generator and recognition head)
    Generator,
    /// Discriminator
    Discriminator,
}

impl fmt::Display for TapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generator => write!(f, "generator-tape"),
            Self::Discriminator => write!(f, "discriminator-tape"),
        }
    }
}

/// Gradient recording scope bound to one model's variables
pub struct GradientTape {
    kind: TapeKind,
    variables: Vec<Var>,
}

impl GradientTape {
    /// Tape over `variables`
    pub fn new(kind: TapeKind, variables: Vec<Var>) -> Self {
        Self { kind, variables }
    }

    /// Tape kind
    pub fn kind(&self) -> TapeKind {
        self.kind
    }

    /// Variables this tape differentiates against
    pub fn variables(&self) -> &[Var] {
        &self.variables
    }

    /// Gradients of `loss` with respect to this tape's variables
    ///
    /// Consumes the tape; the backward graph store is released when the
    /// returned gradients are dropped.
    pub fn gradient(self, loss: &Tensor) -> Result<ModelGradients> {
        let store = loss.backward()?;
        let gradients = ModelGradients {
            kind: self.kind,
            store,
        };
        gradients.ensure_complete(&self.variables)?;
        debug!(tape = %self.kind, variables = self.variables.len(), "Extracted gradients");
        Ok(gradients)
    }
}

/// Gradients produced by one tape
pub struct ModelGradients {
    kind: TapeKind,
    store: GradStore,
}

impl ModelGradients {
    /// Tape these gradients came from
    pub fn kind(&self) -> TapeKind {
        self.kind
    }

    /// Gradient of one variable
    pub fn get(&self, var: &Var) -> Option<&Tensor> {
        self.store.get(var.as_tensor())
    }

    /// Underlying candle gradient store
    pub fn store(&self) -> &GradStore {
        &self.store
    }

    /// Fail on the first variable without a gradient
    pub fn ensure_complete(&self, variables: &[Var]) -> Result<()> {
        for (index, var) in variables.iter().enumerate() {
            if self.get(var).is_none() {
                return Err(Error::DisconnectedGradient {
                    tape: self.kind.to_string(),
                    parameter: index,
                });
            }
        }
        Ok(())
    }

    /// Global L2 norm of the gradients of `variables`
    pub fn global_norm(&self, variables: &[Var]) -> Result<f64> {
        let mut total = 0.0;
        for var in variables {
            if let Some(grad) = self.get(var) {
                total += crate::training::loss::utils::to_f64(&grad.sqr()?.sum_all()?)?;
            }
        }
        Ok(total.sqrt())
    }
}
