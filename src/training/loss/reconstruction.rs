//! Image reconstruction losses for the super-resolution branch

use candle_core::Tensor;

use super::utils::{ensure_same_shape, euclidean_distance, l1_distance};
use crate::error::{Error, Result};
use crate::models::FeatureExtractor;

/// `weight × euclidean_distance(extractor(sr), extractor(gt))`
///
/// The extractor is frozen: the ground-truth features are detached and the
/// extractor owns no variables any optimizer updates.
pub fn perceptual_loss(
    extractor: Option<&dyn FeatureExtractor>,
    sr_images: &Tensor,
    gt_images: &Tensor,
    weight: f64,
    eps: f64,
) -> Result<Tensor> {
    let extractor = extractor.ok_or(Error::MissingFeatureExtractor)?;
    ensure_same_shape(sr_images, gt_images, "perceptual_loss")?;

    let sr_features = extractor.extract(sr_images)?;
    let gt_features = extractor.extract(gt_images)?.detach();
    Ok(euclidean_distance(&sr_features, &gt_features, eps)?.affine(weight, 0.0)?)
}

/// Mean absolute pixel difference scaled by `weight`
pub fn l1_loss(sr_images: &Tensor, gt_images: &Tensor, weight: f64) -> Result<Tensor> {
    Ok(l1_distance(sr_images, gt_images)?.affine(weight, 0.0)?)
}
