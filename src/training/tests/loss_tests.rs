//! Cross-module tests for the SRFR loss engine

use std::sync::Arc;

use approx::assert_relative_eq;
use candle_core::{DType, Device, Tensor};
use test_case::test_case;

use crate::models::{Discriminator, SrfrModel};
use crate::training::loss::utils::to_f64;
use crate::training::loss::{LossConfig, RecognitionTerms, RelativisticActivation, SrfrLoss};
use crate::training::tape::{GradientTape, TapeKind};

use super::fixtures::{IdentityExtractor, ToyDiscriminator, ToySrfrModel, NUM_CLASSES};
use super::mock_data::create_synthetic_batches;

fn engine(activation: RelativisticActivation) -> SrfrLoss {
    SrfrLoss::new(LossConfig {
        relativistic_activation: activation,
        ..Default::default()
    })
    .with_feature_extractor(Arc::new(IdentityExtractor))
}

#[test]
fn test_identical_constant_scores_give_balanced_cross_entropy() {
    let loss = engine(RelativisticActivation::Sigmoid);
    let scores = Tensor::full(0.7f32, (8, 1), &Device::Cpu).unwrap();

    let generator = to_f64(&loss.generator_loss(&scores, &scores).unwrap()).unwrap();
    let discriminator = to_f64(&loss.discriminator_loss(&scores, &scores).unwrap()).unwrap();

    let expected = -(0.5f64.ln());
    assert_relative_eq!(generator, expected, epsilon = 1e-5);
    assert_relative_eq!(discriminator, expected, epsilon = 1e-5);
}

#[test_case(RelativisticActivation::Sigmoid ; "sigmoid")]
#[test_case(RelativisticActivation::RowSoftmax ; "row softmax")]
fn test_generator_matches_discriminator_on_identical_scores(activation: RelativisticActivation) {
    let loss = engine(activation);
    let scores = Tensor::new(&[[0.3f32], [-1.2], [2.0], [0.0], [0.9], [-0.4], [1.1], [0.5]], &Device::Cpu).unwrap();

    let generator = to_f64(&loss.generator_loss(&scores, &scores).unwrap()).unwrap();
    let discriminator = to_f64(&loss.discriminator_loss(&scores, &scores).unwrap()).unwrap();
    assert_relative_eq!(generator, discriminator, epsilon = 1e-6);
}

#[test]
fn test_row_softmax_on_constant_scores_is_uniform_over_batch() {
    let loss = engine(RelativisticActivation::RowSoftmax);
    let scores = Tensor::full(1.0f32, (8, 1), &Device::Cpu).unwrap();

    // every probability is 1/8: mean over both terms of -ln(1/8) and -ln(7/8)
    let expected = (-(1.0f64 / 8.0).ln() - (7.0f64 / 8.0).ln()) / 2.0;
    let generator = to_f64(&loss.generator_loss(&scores, &scores).unwrap()).unwrap();
    assert_relative_eq!(generator, expected, epsilon = 1e-5);
}

#[test]
fn test_generator_rewards_realistic_super_resolution() {
    let loss = engine(RelativisticActivation::Sigmoid);
    let device = Device::Cpu;
    let gt = Tensor::zeros((4, 1), DType::F32, &device).unwrap();
    let convincing = Tensor::full(3.0f32, (4, 1), &device).unwrap();
    let unconvincing = Tensor::full(-3.0f32, (4, 1), &device).unwrap();

    let good = to_f64(&loss.generator_loss(&convincing, &gt).unwrap()).unwrap();
    let bad = to_f64(&loss.generator_loss(&unconvincing, &gt).unwrap()).unwrap();
    assert!(good < bad);

    let d_good = to_f64(&loss.discriminator_loss(&unconvincing, &gt).unwrap()).unwrap();
    let d_bad = to_f64(&loss.discriminator_loss(&convincing, &gt).unwrap()).unwrap();
    assert!(d_good < d_bad);
}

#[test]
fn test_joint_loss_reaches_every_model_variable() {
    let device = Device::Cpu;
    let model = ToySrfrModel::new(&device).unwrap();
    let discriminator = ToyDiscriminator::new(&device).unwrap();
    let batch = &create_synthetic_batches(1, 4, 7)[0];
    let loss = engine(RelativisticActivation::Sigmoid);

    let output = model.forward_synthetic(&batch.low_resolution).unwrap();
    let d_sr = discriminator.forward(&output.super_resolved).unwrap();
    let d_gt = discriminator.forward(&batch.high_resolution).unwrap();
    let total = loss
        .joint_loss(
            &output.super_resolved,
            &batch.high_resolution,
            &d_sr,
            &d_gt,
            RecognitionTerms {
                embeddings: &output.embeddings,
                labels: &batch.class_ids,
                fc_weights: &output.fc_weights,
                num_classes: NUM_CLASSES,
            },
            0,
            None,
        )
        .unwrap();
    assert!(to_f64(&total).unwrap().is_finite());

    let grads = GradientTape::new(TapeKind::Generator, model.trainable_variables())
        .gradient(&total)
        .unwrap();
    for var in model.trainable_variables() {
        assert!(grads.get(&var).is_some());
    }

    let d_loss = loss.discriminator_loss(&d_sr, &d_gt).unwrap();
    assert!(GradientTape::new(TapeKind::Discriminator, discriminator.trainable_variables())
        .gradient(&d_loss)
        .is_ok());
}
