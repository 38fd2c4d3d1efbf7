//! Pair-verification validation for SRFR models
//!
//! The [`Validator`] runs inference over paired verification data under a
//! [`Strategy`], folds the augmented view into each embedding, accumulates
//! replica results in order and turns the interleaved pair embeddings into
//! accuracy, validation rate, AUC and EER.
//!
//! Numeric degeneracies are repaired locally and logged at warn level:
//! all-zero embedding sums become a small constant, NaN entries become zero.

pub mod curve;
pub mod evaluator;

pub use curve::{auc, equal_error_rate, Interp1d};
pub use evaluator::{EvaluationResult, KFoldEvaluator, PairEvaluator};

use std::sync::Arc;

use candle_core::{DType, Tensor};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::ValidationConfig;
use crate::error::{Error, Result};
use crate::models::SrfrModel;
use crate::strategy::Strategy;
use crate::training::data::VerificationBatch;
use crate::training::loss::utils::l2_normalize_rows;

const NORM_EPS: f64 = 1e-12;

/// Verification metrics of one validation pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationMetrics {
    /// Mean held-out accuracy over folds
    pub accuracy_mean: f64,
    /// Population standard deviation of the fold accuracies
    pub accuracy_std: f64,
    /// Validation rate at the FAR target
    pub validation_rate: f64,
    /// Standard deviation of the validation rate
    pub validation_std: f64,
    /// False accept rate reached
    pub far: f64,
    /// Area under the ROC curve
    pub auc: f64,
    /// Equal error rate
    pub eer: f64,
}

/// Collects per-replica embedding tensors into one ordered matrix
#[derive(Debug, Default)]
pub struct EmbeddingAccumulator {
    rows: Vec<Tensor>,
    dim: Option<usize>,
}

impl EmbeddingAccumulator {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one replica's embeddings
    ///
    /// `(batch, dim)` tensors are appended as is, bare `(dim,)` vectors as a
    /// single row. NaN entries are zeroed first.
    pub fn push(&mut self, embeddings: Tensor) -> Result<()> {
        let embeddings = replace_nan(embeddings)?;
        let embeddings = match embeddings.rank() {
            1 => embeddings.unsqueeze(0)?,
            2 => embeddings,
            rank => {
                return Err(Error::shape(format!(
                    "cannot accumulate rank-{} embeddings {:?}",
                    rank,
                    embeddings.dims()
                )))
            }
        };

        let dim = embeddings.dim(1)?;
        match self.dim {
            Some(expected) if expected != dim => {
                return Err(Error::shape(format!(
                    "embedding width {} does not match previously accumulated width {}",
                    dim, expected
                )));
            }
            _ => self.dim = Some(dim),
        }
        self.rows.push(embeddings);
        Ok(())
    }

    /// Rows accumulated so far
    pub fn len(&self) -> usize {
        self.rows.iter().map(|t| t.dims()[0]).sum()
    }

    /// Whether nothing was accumulated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate everything, first push first
    pub fn finish(self) -> Result<Tensor> {
        if self.rows.is_empty() {
            return Err(Error::invalid_input("no embeddings were accumulated"));
        }
        Ok(Tensor::cat(&self.rows, 0)?)
    }
}

/// Zero every NaN entry, warning when any were found
fn replace_nan(xs: Tensor) -> Result<Tensor> {
    let not_nan = xs.eq(&xs)?;
    let finite_count = not_nan.to_dtype(DType::F32)?.sum_all()?.to_scalar::<f32>()? as usize;
    if finite_count == xs.elem_count() {
        return Ok(xs);
    }
    warn!(
        nan_entries = xs.elem_count() - finite_count,
        "Replacing NaN embedding entries with zero"
    );
    Ok(not_nan.where_cond(&xs, &xs.zeros_like()?)?)
}

/// Validation engine over a pair evaluator
pub struct Validator {
    config: ValidationConfig,
    evaluator: Arc<dyn PairEvaluator>,
}

impl Validator {
    /// Validator using the k-fold evaluator configured by `config`
    pub fn new(config: ValidationConfig) -> Result<Self> {
        config.validate()?;
        let evaluator = Arc::new(KFoldEvaluator::from_config(&config));
        Ok(Self { config, evaluator })
    }

    /// Replace the pair evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn PairEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Validation configuration
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// L2-normalized sum of the embeddings of both views
    ///
    /// NaN entries of the sum are zeroed before normalization.
    pub fn predict(&self, model: &dyn SrfrModel, images: &Tensor, augmented: &Tensor) -> Result<Tensor> {
        let original = model.infer(images)?.embeddings;
        let flipped = model.infer(augmented)?.embeddings;
        let mut embeddings = replace_nan(original.add(&flipped)?)?;

        let zeros = embeddings.eq(&embeddings.zeros_like()?)?;
        let zero_count = zeros.to_dtype(DType::F32)?.sum_all()?.to_scalar::<f32>()? as usize;
        if zero_count == embeddings.elem_count() {
            warn!(
                fill = self.config.degenerate_fill,
                shape = ?embeddings.dims(),
                "Embedding sum is all zeros, substituting a constant"
            );
            embeddings = embeddings.ones_like()?.affine(self.config.degenerate_fill, 0.0)?;
        }
        l2_normalize_rows(&embeddings, NORM_EPS)
    }

    /// Embeddings of every batch, in dataset order
    pub fn predict_on_batch<S: Strategy>(
        &self,
        strategy: &S,
        model: &dyn SrfrModel,
        dataset: &[VerificationBatch],
    ) -> Result<Tensor> {
        let mut accumulator = EmbeddingAccumulator::new();
        for batch in dataset {
            let per_replica = strategy.run(&[&batch.images, &batch.augmented], |shard| {
                self.predict(model, &shard[0], &shard[1])
            })?;
            for embeddings in per_replica.into_values() {
                accumulator.push(embeddings)?;
            }
        }
        accumulator.finish()
    }

    /// Interleaved `[left_0, right_0, left_1, right_1, ...]` pair embeddings
    pub fn get_embeddings<S: Strategy>(
        &self,
        strategy: &S,
        model: &dyn SrfrModel,
        left: &[VerificationBatch],
        right: &[VerificationBatch],
        is_same: &[bool],
    ) -> Result<(Tensor, Vec<bool>)> {
        let left = self.predict_on_batch(strategy, model, left)?;
        let right = self.predict_on_batch(strategy, model, right)?;
        let (pairs, dim) = left.dims2()?;
        if right.dims2()? != (pairs, dim) || pairs != is_same.len() {
            return Err(Error::invalid_input(format!(
                "pair set mismatch: {} left, {} right, {} labels",
                pairs,
                right.dim(0)?,
                is_same.len()
            )));
        }
        let interleaved = Tensor::stack(&[&left, &right], 1)?.reshape((2 * pairs, dim))?;
        Ok((interleaved, is_same.to_vec()))
    }

    /// Accuracy, validation rate, AUC and EER over a verification pair set
    #[instrument(skip_all, fields(pairs = is_same.len()))]
    pub fn validate_on_pairs<S: Strategy>(
        &self,
        strategy: &S,
        model: &dyn SrfrModel,
        left: &[VerificationBatch],
        right: &[VerificationBatch],
        is_same: &[bool],
    ) -> Result<VerificationMetrics> {
        let (embeddings, is_same) = self.get_embeddings(strategy, model, left, right, is_same)?;
        let (rows, dim) = embeddings.dims2()?;
        let flat = embeddings.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        let embeddings = Array2::from_shape_vec((rows, dim), flat)
            .map_err(|e| Error::shape(format!("embedding matrix: {}", e)))?;

        let result = self.evaluator.evaluate(&embeddings, &is_same)?;
        let accuracy = Array1::from_vec(result.accuracy.clone());
        let metrics = VerificationMetrics {
            accuracy_mean: accuracy.mean().unwrap_or(0.0),
            accuracy_std: accuracy.std(0.0),
            validation_rate: result.val,
            validation_std: result.val_std,
            far: result.far,
            auc: auc(&result.fpr, &result.tpr)?,
            eer: equal_error_rate(&result.fpr, &result.tpr)?,
        };
        info!(
            accuracy = metrics.accuracy_mean,
            accuracy_std = metrics.accuracy_std,
            val = metrics.validation_rate,
            far = metrics.far,
            auc = metrics.auc,
            eer = metrics.eer,
            "Validation completed"
        );
        Ok(metrics)
    }

    /// `(originals, super_resolved)` of the first batch, for visualization
    pub fn get_super_resolution_samples<S: Strategy>(
        &self,
        strategy: &S,
        model: &dyn SrfrModel,
        dataset: &[VerificationBatch],
    ) -> Result<(Tensor, Tensor)> {
        let batch = dataset
            .first()
            .ok_or_else(|| Error::invalid_input("no batches to sample super-resolution images from"))?;
        let per_replica = strategy.run(&[&batch.images], |shard| Ok(model.infer(&shard[0])?.super_resolved))?;
        let super_resolved = Tensor::cat(&per_replica.into_values(), 0)?;
        Ok((batch.images.clone(), super_resolved))
    }
}
