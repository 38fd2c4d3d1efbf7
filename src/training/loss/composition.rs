//! Joint loss composition for SRFR training
//!
//! [`SrfrLoss`] owns the loss configuration, the frozen perceptual feature
//! extractor and the scalar summary sink, and exposes every loss the
//! training step needs.

use std::sync::Arc;

use candle_core::Tensor;
use tracing::debug;

use super::adversarial;
use super::margin::{self, MarginParams};
use super::reconstruction;
use super::utils::to_f64;
use super::{LossBundle, LossConfig};
use crate::error::Result;
use crate::models::FeatureExtractor;
use crate::training::metrics::{MetricsSink, NoopSink};

/// Summary names written to the metrics sink
pub mod summary {
    /// Weighted perceptual loss
    pub const PERCEPTUAL: &str = "Perceptual Loss";
    /// Relativistic generator loss
    pub const GENERATOR: &str = "Generator Loss";
    /// Weighted L1 loss
    pub const L1: &str = "L1 Loss";
    /// Summed super-resolution loss
    pub const SR_LOSS: &str = "SR Generator";
    /// Classification loss
    pub const CLASSIFICATION: &str = "CrossEntropy";
}

/// Recognition outputs of one branch, fed to the margin loss
#[derive(Debug, Clone, Copy)]
pub struct RecognitionTerms<'a> {
    /// Embeddings `(batch, dim)`
    pub embeddings: &'a Tensor,
    /// Integer class ids `(batch,)`
    pub labels: &'a Tensor,
    /// Classification head weights
    pub fc_weights: &'a Tensor,
    /// Number of classes of this branch's dataset
    pub num_classes: usize,
}

/// Loss engine for SRFR training
pub struct SrfrLoss {
    config: LossConfig,
    feature_extractor: Option<Arc<dyn FeatureExtractor>>,
    sink: Arc<dyn MetricsSink>,
}

impl SrfrLoss {
    /// Loss engine without a feature extractor and with summaries discarded
    pub fn new(config: LossConfig) -> Self {
        Self {
            config,
            feature_extractor: None,
            sink: Arc::new(NoopSink),
        }
    }

    /// Attach the frozen feature extractor used by the perceptual loss
    pub fn with_feature_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.feature_extractor = Some(extractor);
        self
    }

    /// Attach the sink scalar summaries are written to
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the feature extractor in place
    pub fn set_feature_extractor(&mut self, extractor: Arc<dyn FeatureExtractor>) {
        self.feature_extractor = Some(extractor);
    }

    /// Replace the summary sink in place
    pub fn set_metrics_sink(&mut self, sink: Arc<dyn MetricsSink>) {
        self.sink = sink;
    }

    /// Loss configuration
    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Weighted distance between extracted features of both images
    pub fn perceptual_loss(&self, sr_images: &Tensor, gt_images: &Tensor) -> Result<Tensor> {
        reconstruction::perceptual_loss(
            self.feature_extractor.as_deref(),
            sr_images,
            gt_images,
            self.config.weight,
            self.config.epsilon,
        )
    }

    /// Relativistic average generator loss
    pub fn generator_loss(&self, sr_scores: &Tensor, gt_scores: &Tensor) -> Result<Tensor> {
        adversarial::generator_loss(
            sr_scores,
            gt_scores,
            self.config.relativistic_activation,
            self.config.epsilon,
        )
    }

    /// Relativistic average discriminator loss
    pub fn discriminator_loss(&self, sr_scores: &Tensor, gt_scores: &Tensor) -> Result<Tensor> {
        adversarial::discriminator_loss(
            sr_scores,
            gt_scores,
            self.config.relativistic_activation,
            self.config.epsilon,
        )
    }

    /// Weighted mean absolute pixel difference
    pub fn l1_loss(&self, sr_images: &Tensor, gt_images: &Tensor) -> Result<Tensor> {
        reconstruction::l1_loss(sr_images, gt_images, self.config.weight)
    }

    /// Additive angular margin loss with the configured scale and margin
    pub fn margin_classification_loss(&self, terms: RecognitionTerms<'_>) -> Result<Tensor> {
        self.margin_loss_with(terms, self.config.scale, self.config.margin)
    }

    /// Additive angular margin loss with explicit scale and margin
    pub fn margin_loss_with(&self, terms: RecognitionTerms<'_>, scale: f64, margin: f64) -> Result<Tensor> {
        margin::margin_classification_loss(
            terms.embeddings,
            terms.labels,
            terms.fc_weights,
            MarginParams {
                num_classes: terms.num_classes,
                scale,
                margin,
                eps: self.config.epsilon,
                global_batch_size: self.config.global_batch_size,
            },
        )
    }

    /// `classification + weight × (perceptual + generator + l1)`
    #[allow(clippy::too_many_arguments)]
    pub fn joint_loss(
        &self,
        sr_images: &Tensor,
        gt_images: &Tensor,
        disc_sr_scores: &Tensor,
        disc_gt_scores: &Tensor,
        synthetic: RecognitionTerms<'_>,
        step: usize,
        natural: Option<RecognitionTerms<'_>>,
    ) -> Result<Tensor> {
        let bundle = self.joint_loss_bundle(
            sr_images,
            gt_images,
            disc_sr_scores,
            disc_gt_scores,
            synthetic,
            step,
            natural,
        )?;
        Ok(bundle.total)
    }

    /// Joint loss with every intermediate term kept
    ///
    /// Component summaries are always written; the SR and classification
    /// summaries only when no natural branch is present.
    #[allow(clippy::too_many_arguments)]
    pub fn joint_loss_bundle(
        &self,
        sr_images: &Tensor,
        gt_images: &Tensor,
        disc_sr_scores: &Tensor,
        disc_gt_scores: &Tensor,
        synthetic: RecognitionTerms<'_>,
        step: usize,
        natural: Option<RecognitionTerms<'_>>,
    ) -> Result<LossBundle> {
        let perceptual = self.perceptual_loss(sr_images, gt_images)?;
        let generator = self.generator_loss(disc_sr_scores, disc_gt_scores)?;
        let l1 = self.l1_loss(sr_images, gt_images)?;
        let super_resolution = perceptual.add(&generator)?.add(&l1)?;

        self.sink.log_scalar(summary::PERCEPTUAL, to_f64(&perceptual)?, step);
        self.sink.log_scalar(summary::GENERATOR, to_f64(&generator)?, step);
        self.sink.log_scalar(summary::L1, to_f64(&l1)?, step);

        let synthetic_loss = self.margin_classification_loss(synthetic)?;
        let classification = match natural {
            Some(natural) => synthetic_loss.add(&self.margin_classification_loss(natural)?)?,
            None => {
                self.sink.log_scalar(summary::SR_LOSS, to_f64(&super_resolution)?, step);
                self.sink.log_scalar(summary::CLASSIFICATION, to_f64(&synthetic_loss)?, step);
                synthetic_loss
            }
        };

        let total = classification.add(&super_resolution.affine(self.config.weight, 0.0)?)?;
        debug!(step, natural = natural.is_some(), "Computed joint SRFR loss");

        Ok(LossBundle {
            perceptual,
            generator,
            l1,
            super_resolution,
            classification,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::{InMemorySink, MockMetricsSink};
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};
    use mockall::predicate::{always, eq};

    struct Identity;

    impl FeatureExtractor for Identity {
        fn extract(&self, images: &Tensor) -> Result<Tensor> {
            Ok(images.clone())
        }
    }

    struct Inputs {
        sr: Tensor,
        hr: Tensor,
        scores: Tensor,
        embeddings: Tensor,
        labels: Tensor,
        weights: Tensor,
    }

    fn inputs() -> Inputs {
        let device = Device::Cpu;
        Inputs {
            sr: Tensor::full(0.5f32, (2, 1, 4, 4), &device).unwrap(),
            hr: Tensor::ones((2, 1, 4, 4), DType::F32, &device).unwrap(),
            scores: Tensor::zeros((2, 1), DType::F32, &device).unwrap(),
            embeddings: Tensor::new(&[[1f32, 0.], [0., 1.]], &device).unwrap(),
            labels: Tensor::new(&[0u32, 1], &device).unwrap(),
            weights: Tensor::new(&[[1f32, 0.], [0., 1.]], &device).unwrap(),
        }
    }

    fn terms(inputs: &Inputs) -> RecognitionTerms<'_> {
        RecognitionTerms {
            embeddings: &inputs.embeddings,
            labels: &inputs.labels,
            fc_weights: &inputs.weights,
            num_classes: 2,
        }
    }

    #[test]
    fn test_joint_loss_composition() {
        let loss = SrfrLoss::new(LossConfig::default()).with_feature_extractor(Arc::new(Identity));
        let x = inputs();
        let bundle = loss
            .joint_loss_bundle(&x.sr, &x.hr, &x.scores, &x.scores, terms(&x), 0, None)
            .unwrap()
            .to_scalars()
            .unwrap();

        assert_relative_eq!(
            bundle.super_resolution,
            bundle.perceptual + bundle.generator + bundle.l1,
            epsilon = 1e-5
        );
        assert_relative_eq!(
            bundle.total,
            bundle.classification + 0.1 * bundle.super_resolution,
            epsilon = 1e-5
        );
        assert_relative_eq!(bundle.l1, 0.05, epsilon = 1e-6);
    }

    #[test]
    fn test_natural_branch_adds_its_classification_loss() {
        let loss = SrfrLoss::new(LossConfig::default()).with_feature_extractor(Arc::new(Identity));
        let x = inputs();
        let synthetic_only = loss
            .joint_loss_bundle(&x.sr, &x.hr, &x.scores, &x.scores, terms(&x), 0, None)
            .unwrap()
            .to_scalars()
            .unwrap();
        let joint = loss
            .joint_loss_bundle(&x.sr, &x.hr, &x.scores, &x.scores, terms(&x), 0, Some(terms(&x)))
            .unwrap()
            .to_scalars()
            .unwrap();

        assert_relative_eq!(joint.classification, 2.0 * synthetic_only.classification, epsilon = 1e-5);
    }

    #[test]
    fn test_summaries_only_without_natural_branch() {
        let sink = Arc::new(InMemorySink::new());
        let loss = SrfrLoss::new(LossConfig::default())
            .with_feature_extractor(Arc::new(Identity))
            .with_metrics_sink(sink.clone());
        let x = inputs();

        loss.joint_loss(&x.sr, &x.hr, &x.scores, &x.scores, terms(&x), 3, Some(terms(&x)))
            .unwrap();
        assert!(sink.values(summary::SR_LOSS).is_empty());
        assert!(sink.values(summary::CLASSIFICATION).is_empty());

        loss.joint_loss(&x.sr, &x.hr, &x.scores, &x.scores, terms(&x), 4, None)
            .unwrap();
        assert_eq!(sink.values(summary::SR_LOSS).len(), 1);
        assert_eq!(sink.values(summary::CLASSIFICATION)[0].0, 4);
    }

    #[test]
    fn test_summaries_are_keyed_by_step() {
        let mut sink = MockMetricsSink::new();
        sink.expect_log_scalar().with(always(), always(), eq(7)).times(5).return_const(());
        let loss = SrfrLoss::new(LossConfig::default())
            .with_feature_extractor(Arc::new(Identity))
            .with_metrics_sink(Arc::new(sink));
        let x = inputs();

        loss.joint_loss(&x.sr, &x.hr, &x.scores, &x.scores, terms(&x), 7, None)
            .unwrap();
    }

    #[test]
    fn test_joint_loss_without_extractor_fails() {
        let loss = SrfrLoss::new(LossConfig::default());
        let x = inputs();
        let result = loss.joint_loss(&x.sr, &x.hr, &x.scores, &x.scores, terms(&x), 0, None);
        assert!(matches!(result, Err(crate::error::Error::MissingFeatureExtractor)));
    }
}
