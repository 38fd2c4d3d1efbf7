//! Epoch-level learning rate schedules
//!
//! Schedules are stateless: given the rate in force and the epoch that just
//! finished, they return the rate for the next epoch.

use crate::training::config::SchedulerConfig;

/// Learning rate schedule stepped at epoch boundaries
pub trait Scheduler: Send + Sync {
    /// Scheduler name
    fn name(&self) -> &str;

    /// Rate to use after `epoch` completes
    fn next_lr(&self, current_lr: f64, epoch: usize) -> f64;
}

/// Never changes the rate
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantScheduler;

impl Scheduler for ConstantScheduler {
    fn name(&self) -> &str {
        "constant"
    }

    fn next_lr(&self, current_lr: f64, _epoch: usize) -> f64 {
        current_lr
    }
}

/// Multiplies the rate by `factor` every `step_epochs` epochs
#[derive(Debug, Clone, Copy)]
pub struct StepScheduler {
    step_epochs: usize,
    factor: f64,
}

impl StepScheduler {
    /// Create a new step scheduler; a zero period never decays
    pub fn new(step_epochs: usize, factor: f64) -> Self {
        Self { step_epochs, factor }
    }
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new(20, 0.1)
    }
}

impl Scheduler for StepScheduler {
    fn name(&self) -> &str {
        "step"
    }

    fn next_lr(&self, current_lr: f64, epoch: usize) -> f64 {
        if self.step_epochs > 0 && epoch > 0 && epoch % self.step_epochs == 0 {
            current_lr * self.factor
        } else {
            current_lr
        }
    }
}

/// Build the scheduler described by `config`
pub fn create_scheduler(config: &SchedulerConfig) -> Box<dyn Scheduler> {
    match config {
        SchedulerConfig::Constant => Box::new(ConstantScheduler),
        SchedulerConfig::StepDecay { step_epochs, factor } => Box::new(StepScheduler::new(*step_epochs, *factor)),
    }
}
