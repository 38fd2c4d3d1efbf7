//! End-to-end tests: train the toy SRFR model, then validate it

use std::sync::Arc;

use crate::config::ValidationConfig;
use crate::strategy::{MirroredStrategy, SingleReplica};
use crate::training::data::VerificationBatch;
use crate::training::metrics::{InMemorySink, RunningMean};
use crate::training::SrfrTrainer;
use crate::validation::Validator;

use super::fixtures::{IdentityExtractor, ToyDiscriminator, ToySrfrModel};
use super::mock_data::{create_natural_batches, create_synthetic_batches};
use super::test_utils::{assert_tensor_close, create_test_config, create_test_device};

#[test]
fn test_train_then_validate() {
    let device = create_test_device();
    let model = Arc::new(ToySrfrModel::new(&device).unwrap());
    let sink = Arc::new(InMemorySink::new());
    let mut trainer = SrfrTrainer::new(
        create_test_config(),
        model.clone(),
        Arc::new(ToyDiscriminator::new(&device).unwrap()),
    )
    .unwrap()
    .with_feature_extractor(Arc::new(IdentityExtractor))
    .with_metrics_sink(sink.clone());

    let synthetic = create_synthetic_batches(4, 4, 21);
    let natural = create_natural_batches(4, 4, 22);
    for epoch in 1..=2 {
        let report = trainer
            .train_epoch(&synthetic, Some(&natural), &mut RunningMean::new(), &mut RunningMean::new())
            .unwrap();
        assert!(report.loss.is_finite());
        trainer.on_epoch_end(epoch);
    }
    assert_eq!(trainer.global_step(), 8);
    // joint epochs only write the component summaries
    assert_eq!(sink.values("Perceptual Loss").len(), 8);
    assert!(sink.values("CrossEntropy").is_empty());

    let batches: Vec<VerificationBatch> = synthetic
        .iter()
        .map(|b| VerificationBatch::new(b.high_resolution.clone(), b.high_resolution.affine(0.5, 0.0).unwrap()).unwrap())
        .collect();
    let validator = Validator::new(ValidationConfig::default()).unwrap();

    let single = validator.predict_on_batch(&SingleReplica, model.as_ref(), &batches).unwrap();
    let mirrored = validator
        .predict_on_batch(&MirroredStrategy::new(3).unwrap(), model.as_ref(), &batches)
        .unwrap();
    assert_eq!(single.dims(), &[16, 8]);
    assert_tensor_close(&mirrored, &single, 1e-5);

    let (originals, super_resolved) = validator
        .get_super_resolution_samples(&MirroredStrategy::new(2).unwrap(), model.as_ref(), &batches)
        .unwrap();
    assert_eq!(originals.dims(), super_resolved.dims());
}

#[test]
fn test_trainer_from_saved_config() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("srfr.yaml");
    let config = crate::config::Config {
        training: create_test_config(),
        ..Default::default()
    };
    config.save(&path).unwrap();

    let loaded = crate::config::Config::from_file(&path).unwrap();
    assert_eq!(loaded.training.batch_size, 4);

    let device = create_test_device();
    let mut trainer = SrfrTrainer::new(
        loaded.training,
        Arc::new(ToySrfrModel::new(&device).unwrap()),
        Arc::new(ToyDiscriminator::new(&device).unwrap()),
    )
    .unwrap()
    .with_feature_extractor(Arc::new(IdentityExtractor));
    let losses = trainer
        .train_step_synthetic(&create_synthetic_batches(1, 4, 5)[0], 0)
        .unwrap();
    assert!(losses.srfr.is_finite());
    assert!(losses.discriminator.is_finite());
}
