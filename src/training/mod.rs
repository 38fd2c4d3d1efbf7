//! Training infrastructure for SRFR models
//!
//! This module provides the adversarial training core: the composite loss
//! engine, per-model gradient tapes, optimizers with an epoch-level learning
//! rate schedule, scalar metrics sinks and the epoch-driving trainer.
//!
//! # Main Components
//!
//! - **Configuration**: training, optimizer and scheduler settings
//! - **Loss**: perceptual, relativistic adversarial, L1 and angular margin losses
//! - **Tape**: independent gradient scopes for the SRFR model and the discriminator
//! - **Optimizers**: AdamW and SGD over candle variables, step decay schedule
//! - **Metrics**: step-indexed scalar sinks and loss aggregators
//! - **Trainer**: synthetic-only, joint and recognition-only epochs
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use srfr::training::{SrfrTrainer, TrainingConfig, RunningMean};
//!
//! let mut trainer = SrfrTrainer::new(TrainingConfig::default(), model, discriminator)?
//!     .with_feature_extractor(vgg)
//!     .with_event_monitoring(tx);
//!
//! for epoch in 1..=num_epochs {
//!     let report = trainer.train_epoch(&batches, None, &mut RunningMean::new(), &mut RunningMean::new())?;
//!     trainer.on_epoch_end(epoch);
//! }
//! ```

pub mod config;
pub mod data;
pub mod loss;
pub mod metrics;
pub mod optimizers;
pub mod tape;
pub mod trainer;

#[cfg(test)]
pub mod tests;

// Configuration re-exports
pub use config::{OptimizerConfig, OptimizerType, SchedulerConfig, TrainingConfig};

// Trainer re-exports
pub use trainer::{num_epochs_for_iterations, EpochReport, SrfrTrainer, StepLosses, TrainingEvent};

// Data re-exports
pub use data::{NaturalBatch, SyntheticBatch, VerificationBatch};

// Loss re-exports
pub use loss::{LossBundle, LossConfig, LossScalars, RecognitionTerms, RelativisticActivation, SrfrLoss};

// Metrics re-exports
pub use metrics::{
    InMemorySink, LastValue, LossAggregator, MetricsSink, NoopSink, PrometheusSink, RunningMean, TracingSink,
};

// Optimizer re-exports
pub use optimizers::{
    create_optimizer, create_scheduler, AdamWOptimizer, ConstantScheduler, Optimizer, SGDOptimizer, Scheduler,
    StepScheduler,
};

pub use tape::{GradientTape, ModelGradients, TapeKind};
