//! Batch types consumed by the training step and validation engine
//!
//! Dataset decoding lives outside this crate; callers hand over already
//! batched tensors. Every batch checks that its tensors agree on the leading
//! (batch) dimension before it reaches a model.

use candle_core::Tensor;

use crate::config::DatasetShape;
use crate::error::{Error, Result};

/// Synthetic-domain batch `(low_res, high_res, class_id)`
#[derive(Debug, Clone)]
pub struct SyntheticBatch {
    /// Low-resolution inputs
    pub low_resolution: Tensor,
    /// High-resolution ground truth
    pub high_resolution: Tensor,
    /// Integer class ids `(batch,)`
    pub class_ids: Tensor,
}

impl SyntheticBatch {
    /// Build and validate a batch
    pub fn new(low_resolution: Tensor, high_resolution: Tensor, class_ids: Tensor) -> Result<Self> {
        let batch = Self {
            low_resolution,
            high_resolution,
            class_ids,
        };
        batch.validate()?;
        Ok(batch)
    }

    /// Split a decoded record into a batch according to the dataset layout
    ///
    /// `ImageImageClassSample` records carry a trailing sample-id tensor that
    /// training does not use; it is checked for length and dropped.
    pub fn from_record(record: Vec<Tensor>, shape: DatasetShape) -> Result<Self> {
        let expected = if shape.has_sample_ids() { 4 } else { 3 };
        if record.len() != expected {
            return Err(Error::invalid_input(format!(
                "expected {} tensors for {:?} record, got {}",
                expected,
                shape,
                record.len()
            )));
        }
        let mut parts = record.into_iter();
        let (Some(low), Some(high), Some(ids)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::invalid_input("truncated synthetic record"));
        };
        if let Some(sample_ids) = parts.next() {
            leading_dims(&[&low, &sample_ids])?;
        }
        Self::new(low, high, ids)
    }

    /// Batch size
    pub fn len(&self) -> usize {
        self.class_ids.dims().first().copied().unwrap_or(0)
    }

    /// Whether the batch holds no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that all tensors share the batch dimension
    pub fn validate(&self) -> Result<()> {
        leading_dims(&[&self.low_resolution, &self.high_resolution, &self.class_ids]).map(|_| ())
    }
}

/// Natural-domain batch `(image, class_id)`
#[derive(Debug, Clone)]
pub struct NaturalBatch {
    /// Images
    pub images: Tensor,
    /// Integer class ids `(batch,)`
    pub class_ids: Tensor,
}

impl NaturalBatch {
    /// Build and validate a batch
    pub fn new(images: Tensor, class_ids: Tensor) -> Result<Self> {
        leading_dims(&[&images, &class_ids])?;
        Ok(Self { images, class_ids })
    }

    /// Batch size
    pub fn len(&self) -> usize {
        self.class_ids.dims().first().copied().unwrap_or(0)
    }

    /// Whether the batch holds no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that images and class ids share the batch dimension
    pub fn validate(&self) -> Result<()> {
        leading_dims(&[&self.images, &self.class_ids]).map(|_| ())
    }
}

/// Verification images and their augmented view
#[derive(Debug, Clone)]
pub struct VerificationBatch {
    /// Original images
    pub images: Tensor,
    /// Augmented (e.g. flipped) images, same shape
    pub augmented: Tensor,
}

impl VerificationBatch {
    /// Build and validate a batch
    pub fn new(images: Tensor, augmented: Tensor) -> Result<Self> {
        if images.dims() != augmented.dims() {
            return Err(Error::shape(format!(
                "augmented view {:?} does not match images {:?}",
                augmented.dims(),
                images.dims()
            )));
        }
        Ok(Self { images, augmented })
    }

    /// Batch size
    pub fn len(&self) -> usize {
        self.images.dims().first().copied().unwrap_or(0)
    }

    /// Whether the batch holds no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn leading_dims(tensors: &[&Tensor]) -> Result<usize> {
    let mut batch = None;
    for tensor in tensors {
        let Some(&leading) = tensor.dims().first() else {
            return Err(Error::shape("batch tensors must have a leading batch dimension"));
        };
        match batch {
            None => batch = Some(leading),
            Some(expected) if expected != leading => {
                return Err(Error::shape(format!(
                    "batch dimension mismatch: {} vs {}",
                    expected, leading
                )));
            }
            Some(_) => {}
        }
    }
    Ok(batch.unwrap_or(0))
}
