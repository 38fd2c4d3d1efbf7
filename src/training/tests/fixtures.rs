//! Toy models standing in for the SRFR networks in tests
//!
//! Images are `(batch, 1, 4, 4)`. The SRFR model super-resolves with a
//! learned affine map and embeds with a linear projection, the discriminator
//! is a single linear layer, and the feature extractor is the identity. Every
//! variable is reachable from the loss it is trained by.

use candle_core::{Device, Tensor, Var};

use crate::error::Result;
use crate::models::{
    Discriminator, FeatureExtractor, InferenceOutput, JointOutput, RecognitionModel, SrfrModel, SyntheticOutput,
};

pub const IMAGE_SIDE: usize = 4;
pub const PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;
pub const EMBEDDING_DIM: usize = 8;
pub const NUM_CLASSES: usize = 4;

pub struct ToySrfrModel {
    pub scale: Var,
    pub shift: Var,
    pub projection: Var,
    pub fc: Var,
}

impl ToySrfrModel {
    pub fn new(device: &Device) -> Result<Self> {
        Ok(Self {
            scale: Var::new(&[1f32], device)?,
            shift: Var::new(&[0f32], device)?,
            projection: Var::from_tensor(&Tensor::randn(0f32, 0.5, (PIXELS, EMBEDDING_DIM), device)?)?,
            fc: Var::from_tensor(&Tensor::randn(0f32, 1.0, (NUM_CLASSES, EMBEDDING_DIM), device)?)?,
        })
    }

    fn super_resolve(&self, images: &Tensor) -> Result<Tensor> {
        Ok(images
            .broadcast_mul(self.scale.as_tensor())?
            .broadcast_add(self.shift.as_tensor())?)
    }

    fn embed(&self, images: &Tensor) -> Result<Tensor> {
        Ok(images.flatten_from(1)?.matmul(self.projection.as_tensor())?)
    }
}

impl SrfrModel for ToySrfrModel {
    fn forward_synthetic(&self, low_resolution: &Tensor) -> Result<SyntheticOutput> {
        let super_resolved = self.super_resolve(low_resolution)?;
        let embeddings = self.embed(&super_resolved)?;
        Ok(SyntheticOutput {
            super_resolved,
            embeddings,
            fc_weights: self.fc.as_tensor().clone(),
        })
    }

    fn forward_joint(&self, synthetic: &Tensor, natural: &Tensor) -> Result<JointOutput> {
        Ok(JointOutput {
            synthetic: self.forward_synthetic(synthetic)?,
            natural: self.forward_synthetic(natural)?,
        })
    }

    fn infer(&self, images: &Tensor) -> Result<InferenceOutput> {
        let output = self.forward_synthetic(images)?;
        Ok(InferenceOutput {
            super_resolved: output.super_resolved.detach(),
            embeddings: output.embeddings.detach(),
        })
    }

    fn trainable_variables(&self) -> Vec<Var> {
        vec![self.scale.clone(), self.shift.clone(), self.projection.clone(), self.fc.clone()]
    }
}

/// Toy SRFR model exposing one variable no loss ever reaches
pub struct DisconnectedSrfrModel {
    pub inner: ToySrfrModel,
    pub unused: Var,
}

impl DisconnectedSrfrModel {
    pub fn new(device: &Device) -> Result<Self> {
        Ok(Self {
            inner: ToySrfrModel::new(device)?,
            unused: Var::new(&[0f32, 0.], device)?,
        })
    }
}

impl SrfrModel for DisconnectedSrfrModel {
    fn forward_synthetic(&self, low_resolution: &Tensor) -> Result<SyntheticOutput> {
        self.inner.forward_synthetic(low_resolution)
    }

    fn forward_joint(&self, synthetic: &Tensor, natural: &Tensor) -> Result<JointOutput> {
        self.inner.forward_joint(synthetic, natural)
    }

    fn infer(&self, images: &Tensor) -> Result<InferenceOutput> {
        self.inner.infer(images)
    }

    fn trainable_variables(&self) -> Vec<Var> {
        let mut vars = self.inner.trainable_variables();
        vars.push(self.unused.clone());
        vars
    }
}

pub struct ToyDiscriminator {
    pub weight: Var,
}

impl ToyDiscriminator {
    pub fn new(device: &Device) -> Result<Self> {
        Ok(Self {
            weight: Var::from_tensor(&Tensor::randn(0f32, 0.5, (PIXELS, 1), device)?)?,
        })
    }
}

impl Discriminator for ToyDiscriminator {
    fn forward(&self, images: &Tensor) -> Result<Tensor> {
        Ok(images.flatten_from(1)?.matmul(self.weight.as_tensor())?)
    }

    fn trainable_variables(&self) -> Vec<Var> {
        vec![self.weight.clone()]
    }
}

pub struct IdentityExtractor;

impl FeatureExtractor for IdentityExtractor {
    fn extract(&self, images: &Tensor) -> Result<Tensor> {
        Ok(images.clone())
    }
}

/// Recognition-only network sharing the toy SRFR embedding head
pub struct ToyRecognitionModel {
    pub projection: Var,
    pub fc: Var,
}

impl ToyRecognitionModel {
    pub fn new(device: &Device) -> Result<Self> {
        Ok(Self {
            projection: Var::from_tensor(&Tensor::randn(0f32, 0.5, (PIXELS, EMBEDDING_DIM), device)?)?,
            fc: Var::from_tensor(&Tensor::randn(0f32, 1.0, (NUM_CLASSES, EMBEDDING_DIM), device)?)?,
        })
    }
}

impl RecognitionModel for ToyRecognitionModel {
    fn forward(&self, images: &Tensor) -> Result<(Tensor, Tensor)> {
        let embeddings = images.flatten_from(1)?.matmul(self.projection.as_tensor())?;
        Ok((embeddings, self.fc.as_tensor().clone()))
    }

    fn trainable_variables(&self) -> Vec<Var> {
        vec![self.projection.clone(), self.fc.clone()]
    }
}

/// Inference-only model whose embeddings are the flattened images
///
/// Lets validation tests choose embeddings exactly through image content.
pub struct PassthroughModel;

impl SrfrModel for PassthroughModel {
    fn forward_synthetic(&self, low_resolution: &Tensor) -> Result<SyntheticOutput> {
        let embeddings = low_resolution.flatten_from(1)?;
        Ok(SyntheticOutput {
            super_resolved: low_resolution.clone(),
            fc_weights: embeddings.zeros_like()?,
            embeddings,
        })
    }

    fn forward_joint(&self, synthetic: &Tensor, natural: &Tensor) -> Result<JointOutput> {
        Ok(JointOutput {
            synthetic: self.forward_synthetic(synthetic)?,
            natural: self.forward_synthetic(natural)?,
        })
    }

    fn infer(&self, images: &Tensor) -> Result<InferenceOutput> {
        Ok(InferenceOutput {
            super_resolved: images.clone(),
            embeddings: images.flatten_from(1)?,
        })
    }

    fn trainable_variables(&self) -> Vec<Var> {
        Vec::new()
    }
}

/// Returns bare `(dim,)` embeddings for single-image batches
pub struct SqueezingModel;

impl SrfrModel for SqueezingModel {
    fn forward_synthetic(&self, low_resolution: &Tensor) -> Result<SyntheticOutput> {
        PassthroughModel.forward_synthetic(low_resolution)
    }

    fn forward_joint(&self, synthetic: &Tensor, natural: &Tensor) -> Result<JointOutput> {
        PassthroughModel.forward_joint(synthetic, natural)
    }

    fn infer(&self, images: &Tensor) -> Result<InferenceOutput> {
        let mut output = PassthroughModel.infer(images)?;
        if output.embeddings.dim(0)? == 1 {
            output.embeddings = output.embeddings.squeeze(0)?;
        }
        Ok(output)
    }

    fn trainable_variables(&self) -> Vec<Var> {
        Vec::new()
    }
}
