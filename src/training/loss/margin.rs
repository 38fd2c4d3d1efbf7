//! Additive angular margin classification loss (ArcFace style)
//!
//! Embeddings and class weights are L2-normalised so their product is
//! `cos(theta)`. The ground-truth class logit becomes `cos(theta + margin)`,
//! every logit is multiplied by `scale`, and the result goes through softmax
//! and categorical cross-entropy against the one-hot labels.
//!
//! `cos(theta + m)` is expanded as `cos θ cos m - sin θ sin m` with
//! `sin θ = sqrt(1 - cos² θ)`, which equals `cos(arccos(cos θ) + m)` for
//! `θ ∈ [0, π]` and keeps the whole expression differentiable.

use candle_core::Tensor;

use super::utils::{categorical_crossentropy, l2_normalize_rows, one_hot, softmax, sum_over_batch_size};
use crate::error::{Error, Result};

const NORM_EPS: f64 = 1e-12;

/// Inputs and hyperparameters of the margin loss
#[derive(Debug, Clone, Copy)]
pub struct MarginParams {
    /// Number of identity classes
    pub num_classes: usize,
    /// Logit scale
    pub scale: f64,
    /// Additive angular margin in radians
    pub margin: f64,
    /// Probability clipping epsilon
    pub eps: f64,
    /// Divisor of the summed per-sample losses; local batch when `None`
    pub global_batch_size: Option<usize>,
}

/// Margin-based classification loss over `(batch, dim)` embeddings
///
/// `fc_weights` is `(num_classes, dim)`; a `(dim, num_classes)` kernel is
/// accepted and transposed.
pub fn margin_classification_loss(
    embeddings: &Tensor,
    labels: &Tensor,
    fc_weights: &Tensor,
    params: MarginParams,
) -> Result<Tensor> {
    let one_hot = one_hot(labels, params.num_classes, embeddings.dtype(), embeddings.device())?;
    if one_hot.dim(0)? != embeddings.dim(0)? {
        return Err(Error::invalid_input(format!(
            "{} labels for {} embeddings",
            one_hot.dim(0)?,
            embeddings.dim(0)?
        )));
    }

    let logits = margin_logits(embeddings, &one_hot, fc_weights, params)?;
    let per_sample = categorical_crossentropy(&softmax(&logits)?, &one_hot, params.eps)?;
    sum_over_batch_size(&per_sample, params.global_batch_size)
}

/// Scaled logits with the angular margin applied to the ground-truth class
pub fn margin_logits(
    embeddings: &Tensor,
    one_hot: &Tensor,
    fc_weights: &Tensor,
    params: MarginParams,
) -> Result<Tensor> {
    let weights = class_major(fc_weights, embeddings.dim(1)?, params.num_classes)?;

    let embeddings = l2_normalize_rows(embeddings, NORM_EPS)?;
    let weights = l2_normalize_rows(&weights, NORM_EPS)?;

    // Rounding can push the cosine slightly past ±1
    let cos_theta = embeddings.matmul(&weights.t()?)?.clamp(-1.0, 1.0)?;
    let sin_theta = cos_theta
        .sqr()?
        .affine(-1.0, 1.0)?
        .clamp(params.eps, 1.0)?
        .sqrt()?;

    let cos_theta_m = cos_theta
        .affine(params.margin.cos(), 0.0)?
        .sub(&sin_theta.affine(params.margin.sin(), 0.0)?)?;

    let penalty = one_hot.mul(&cos_theta_m.sub(&cos_theta)?)?;
    Ok(cos_theta.add(&penalty)?.affine(params.scale, 0.0)?)
}

fn class_major(fc_weights: &Tensor, dim: usize, num_classes: usize) -> Result<Tensor> {
    let (rows, cols) = fc_weights.dims2()?;
    if rows == num_classes && cols == dim {
        Ok(fc_weights.clone())
    } else if rows == dim && cols == num_classes {
        Ok(fc_weights.t()?)
    } else {
        Err(Error::invalid_input(format!(
            "fc weights {:?} do not match {} classes of dimension {}",
            fc_weights.dims(),
            num_classes,
            dim
        )))
    }
}
