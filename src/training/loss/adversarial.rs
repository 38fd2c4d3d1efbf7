//! Relativistic average GAN losses
//!
//! Both losses compare each side's scores against the mean score of the other
//! side. The generator wants super-resolved images to look more real than the
//! real ones; the discriminator wants the opposite, so the two losses only
//! differ in their target labels.

use candle_core::Tensor;

use super::utils::{binary_crossentropy, sigmoid, softmax};
use super::RelativisticActivation;
use crate::error::Result;

/// Relativistic generator loss
///
/// Label 0 for the ground-truth-centred term, 1 for the super-resolution
/// centred term; the result is the mean of the two cross-entropies.
pub fn generator_loss(
    sr_scores: &Tensor,
    gt_scores: &Tensor,
    activation: RelativisticActivation,
    eps: f64,
) -> Result<Tensor> {
    relativistic_loss(sr_scores, gt_scores, activation, eps, Target::FakeLooksReal)
}

/// Relativistic discriminator loss, the mirror of [`generator_loss`]
pub fn discriminator_loss(
    sr_scores: &Tensor,
    gt_scores: &Tensor,
    activation: RelativisticActivation,
    eps: f64,
) -> Result<Tensor> {
    relativistic_loss(sr_scores, gt_scores, activation, eps, Target::RealLooksReal)
}

#[derive(Clone, Copy)]
enum Target {
    FakeLooksReal,
    RealLooksReal,
}

fn relativistic_loss(
    sr_scores: &Tensor,
    gt_scores: &Tensor,
    activation: RelativisticActivation,
    eps: f64,
    target: Target,
) -> Result<Tensor> {
    let sr_mean = sr_scores.mean_all()?;
    let gt_mean = gt_scores.mean_all()?;

    let gt_relative = to_single_row(&gt_scores.broadcast_sub(&sr_mean)?)?;
    let sr_relative = to_single_row(&sr_scores.broadcast_sub(&gt_mean)?)?;

    let gt_probs = activate(&gt_relative, activation)?;
    let sr_probs = activate(&sr_relative, activation)?;

    let (gt_target, sr_target) = match target {
        Target::FakeLooksReal => (gt_probs.zeros_like()?, sr_probs.ones_like()?),
        Target::RealLooksReal => (gt_probs.ones_like()?, sr_probs.zeros_like()?),
    };

    let gt_term = binary_crossentropy(&gt_target, &gt_probs, eps)?;
    let sr_term = binary_crossentropy(&sr_target, &sr_probs, eps)?;
    Ok(gt_term.add(&sr_term)?.affine(0.5, 0.0)?)
}

/// Collapse singleton dimensions and re-expand as a batch of one row.
///
/// Scores arrive as `(batch, 1)`; a softmax over that trailing axis is always
/// 1, so the scores are laid out as `(1, batch)` first.
pub fn to_single_row(scores: &Tensor) -> Result<Tensor> {
    Ok(scores.flatten_all()?.unsqueeze(0)?)
}

fn activate(row: &Tensor, activation: RelativisticActivation) -> Result<Tensor> {
    match activation {
        RelativisticActivation::Sigmoid => sigmoid(row),
        RelativisticActivation::RowSoftmax => softmax(row),
    }
}
