//! SRFR - joint super-resolution and face-recognition training in Rust
//!
//! This crate trains a model that super-resolves low-resolution faces and
//! embeds them for recognition, adversarially against a discriminator, and
//! evaluates the resulting embeddings on face-verification pairs.
//!
//! The networks themselves are supplied by the caller through the traits in
//! [`models`]; the crate owns the losses, the two-tape training step, the
//! optimizers and schedule, the epoch loop and the verification metrics.

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod error;
pub mod models;
pub mod strategy;
pub mod training;
pub mod utils;
pub mod validation;

// Re-exports
pub use config::{Config, DatasetShape, ValidationConfig};
pub use error::{Error, Result};
pub use models::{Discriminator, FeatureExtractor, RecognitionModel, SrfrModel};
pub use strategy::{MirroredStrategy, PerReplica, SingleReplica, Strategy};
pub use training::{EpochReport, SrfrLoss, SrfrTrainer, TrainingConfig, TrainingEvent};
pub use validation::{Validator, VerificationMetrics};
