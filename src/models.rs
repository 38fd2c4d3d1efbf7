//! Callable contracts for the networks consumed by training and validation
//!
//! The generator, discriminator, recognition backbone and perceptual feature
//! extractor are opaque to this crate. Each is expressed as a trait so any
//! candle module can be plugged in, and so tests can use tiny stand-ins.

use candle_core::{Tensor, Var};

use crate::error::Result;

/// Outputs of the SRFR model on a synthetic low-resolution batch
#[derive(Debug, Clone)]
pub struct SyntheticOutput {
    /// Super-resolved images, same shape as the high-resolution targets
    pub super_resolved: Tensor,
    /// Identity embeddings `(batch, dim)`
    pub embeddings: Tensor,
    /// Final classification layer weights `(num_classes, dim)`
    pub fc_weights: Tensor,
}

/// Outputs of the SRFR model when fed both domains at once
#[derive(Debug, Clone)]
pub struct JointOutput {
    /// Synthetic-branch outputs
    pub synthetic: SyntheticOutput,
    /// Natural-branch outputs
    pub natural: SyntheticOutput,
}

/// Inference outputs, no parameter updates expected
#[derive(Debug, Clone)]
pub struct InferenceOutput {
    /// Super-resolved images
    pub super_resolved: Tensor,
    /// Identity embeddings
    pub embeddings: Tensor,
}

/// Joint super-resolution and face-recognition network
pub trait SrfrModel: Send + Sync {
    /// `model(low_res_batch) -> (sr_image, embeddings, fc_weights)`
    fn forward_synthetic(&self, low_resolution: &Tensor) -> Result<SyntheticOutput>;

    /// `model(synthetic_batch, natural_batch)` returning both branches
    fn forward_joint(&self, synthetic: &Tensor, natural: &Tensor) -> Result<JointOutput>;

    /// `model(image_batch, training=False) -> (sr_image, embeddings)`
    fn infer(&self, images: &Tensor) -> Result<InferenceOutput>;

    /// Variables updated by the SRFR optimizer
    fn trainable_variables(&self) -> Vec<Var>;
}

/// Discriminator scoring images as real or super-resolved
pub trait Discriminator: Send + Sync {
    /// Returns a score tensor of shape `(batch, 1)`
    fn forward(&self, images: &Tensor) -> Result<Tensor>;

    /// Variables updated by the discriminator optimizer
    fn trainable_variables(&self) -> Vec<Var>;
}

/// Frozen feature extractor used by the perceptual loss
pub trait FeatureExtractor: Send + Sync {
    /// Maps an image batch to a feature tensor with leading batch dimension
    fn extract(&self, images: &Tensor) -> Result<Tensor>;
}

/// Plain face-recognition network, trained without the SR branch
pub trait RecognitionModel: Send + Sync {
    /// Returns `(embeddings, fc_weights)`
    fn forward(&self, images: &Tensor) -> Result<(Tensor, Tensor)>;

    /// Variables updated by its optimizer
    fn trainable_variables(&self) -> Vec<Var>;
}
