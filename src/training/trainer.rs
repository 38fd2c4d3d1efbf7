//! Adversarial SRFR trainer
//!
//! This module provides [`SrfrTrainer`], which runs the dual-optimizer
//! training step (synthetic-only and joint synthetic + natural variants),
//! drives whole epochs with periodic progress records, and applies the
//! epoch-level learning rate schedule to both optimizers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::error::{Error, Result};
use crate::models::{Discriminator, FeatureExtractor, RecognitionModel, SrfrModel};
use crate::training::config::TrainingConfig;
use crate::training::data::{NaturalBatch, SyntheticBatch};
use crate::training::loss::utils::to_f64;
use crate::training::loss::{RecognitionTerms, SrfrLoss};
use crate::training::metrics::{LossAggregator, MetricsSink, RunningMean};
use crate::training::optimizers::{create_optimizer, create_scheduler, Optimizer, Scheduler};
use crate::training::tape::{GradientTape, TapeKind};

/// Events emitted while training, for external monitoring
#[derive(Debug, Clone)]
pub enum TrainingEvent {
    /// Epoch started
    EpochStarted {
        /// Epoch index
        epoch: usize,
        /// Wall-clock start time
        timestamp: DateTime<Utc>,
    },
    /// Periodic progress record, every `log_every_steps` steps
    Progress {
        /// One-based step within the epoch
        step: usize,
        /// SRFR (or recognition) loss of the step
        loss: f64,
        /// Discriminator loss, absent for recognition-only training
        discriminator_loss: Option<f64>,
        /// Samples processed so far in the epoch
        samples_seen: usize,
    },
    /// Epoch completed
    EpochCompleted {
        /// Epoch index
        epoch: usize,
        /// Epoch summary
        report: EpochReport,
    },
    /// Learning rate changed by the scheduler
    LearningRateChanged {
        /// Epoch the new rate applies from
        epoch: usize,
        /// New learning rate
        learning_rate: f64,
    },
    /// Training error occurred
    Error {
        /// Error message
        error: String,
    },
}

/// Losses of one adversarial step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepLosses {
    /// Joint SRFR loss
    pub srfr: f64,
    /// Discriminator loss
    pub discriminator: f64,
}

/// Summary of one epoch
///
/// `loss` and `discriminator_loss` are the final step's losses passed
/// through the caller's aggregators; the `*_epoch_mean` fields average every
/// step of the epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochReport {
    /// Final-step SRFR (or recognition) loss, aggregated
    pub loss: f64,
    /// Final-step discriminator loss, aggregated; `None` for recognition-only epochs
    pub discriminator_loss: Option<f64>,
    /// Mean SRFR loss over all steps
    pub loss_epoch_mean: f64,
    /// Mean discriminator loss over all steps
    pub discriminator_epoch_mean: Option<f64>,
    /// Steps run
    pub steps: usize,
    /// `steps × batch_size`
    pub samples_seen: usize,
    /// Epoch start
    pub started_at: DateTime<Utc>,
    /// Epoch end
    pub finished_at: DateTime<Utc>,
}

/// Trainer for the joint super-resolution / face-recognition model
pub struct SrfrTrainer {
    /// Training configuration
    config: TrainingConfig,

    /// SRFR model (generator and recognition head)
    model: Arc<dyn SrfrModel>,

    /// Discriminator
    discriminator: Arc<dyn Discriminator>,

    /// Loss engine
    loss: SrfrLoss,

    /// Optimizer over the SRFR model's variables
    srfr_optimizer: Box<dyn Optimizer>,

    /// Optimizer over the discriminator's variables
    discriminator_optimizer: Box<dyn Optimizer>,

    /// Epoch-level learning rate schedule
    scheduler: Box<dyn Scheduler>,

    /// Index of the next epoch to run
    epoch: usize,

    /// Steps run across all epochs, used to key summaries
    global_step: usize,

    /// Event channel for monitoring
    event_tx: Option<mpsc::UnboundedSender<TrainingEvent>>,
}

impl SrfrTrainer {
    /// Create a new trainer; each optimizer is built over its own model's variables
    pub fn new(
        config: TrainingConfig,
        model: Arc<dyn SrfrModel>,
        discriminator: Arc<dyn Discriminator>,
    ) -> Result<Self> {
        config.validate()?;

        let srfr_optimizer = create_optimizer(&config.srfr_optimizer, model.trainable_variables())?;
        let discriminator_optimizer =
            create_optimizer(&config.discriminator_optimizer, discriminator.trainable_variables())?;
        let scheduler = create_scheduler(&config.scheduler);
        let loss = SrfrLoss::new(config.loss.clone());

        info!(
            srfr_variables = srfr_optimizer.variables().len(),
            discriminator_variables = discriminator_optimizer.variables().len(),
            scheduler = scheduler.name(),
            "Initialized SRFR trainer"
        );

        Ok(Self {
            config,
            model,
            discriminator,
            loss,
            srfr_optimizer,
            discriminator_optimizer,
            scheduler,
            epoch: 0,
            global_step: 0,
            event_tx: None,
        })
    }

    /// Set the frozen feature extractor used by the perceptual loss
    pub fn with_feature_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.loss.set_feature_extractor(extractor);
        self
    }

    /// Send loss summaries to `sink`
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.loss.set_metrics_sink(sink);
        self
    }

    /// Set up event monitoring
    pub fn with_event_monitoring(mut self, tx: mpsc::UnboundedSender<TrainingEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Training configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Loss engine
    pub fn loss(&self) -> &SrfrLoss {
        &self.loss
    }

    /// Steps run across all epochs
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Index of the next epoch to run
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Current `(srfr, discriminator)` learning rates
    pub fn learning_rates(&self) -> (f64, f64) {
        (
            self.srfr_optimizer.learning_rate(),
            self.discriminator_optimizer.learning_rate(),
        )
    }

    /// One synthetic-only adversarial step
    pub fn train_step_synthetic(&mut self, batch: &SyntheticBatch, step: usize) -> Result<StepLosses> {
        batch.validate()?;
        let output = self.model.forward_synthetic(&batch.low_resolution)?;
        let disc_sr = self.discriminator.forward(&output.super_resolved)?;
        let disc_gt = self.discriminator.forward(&batch.high_resolution)?;

        let synthetic = RecognitionTerms {
            embeddings: &output.embeddings,
            labels: &batch.class_ids,
            fc_weights: &output.fc_weights,
            num_classes: self.config.num_classes_synthetic,
        };
        let srfr_loss = self.loss.joint_loss(
            &output.super_resolved,
            &batch.high_resolution,
            &disc_sr,
            &disc_gt,
            synthetic,
            step,
            None,
        )?;
        let discriminator_loss = self.loss.discriminator_loss(&disc_sr, &disc_gt)?;

        self.apply_adversarial_update(&srfr_loss, &discriminator_loss)
    }

    /// One joint step over a synthetic and a natural batch
    pub fn train_step_joint(
        &mut self,
        synthetic_batch: &SyntheticBatch,
        natural_batch: &NaturalBatch,
        step: usize,
    ) -> Result<StepLosses> {
        synthetic_batch.validate()?;
        natural_batch.validate()?;
        let num_classes_natural = self
            .config
            .num_classes_natural
            .ok_or_else(|| Error::config("joint training requires num_classes_natural"))?;

        let output = self
            .model
            .forward_joint(&synthetic_batch.low_resolution, &natural_batch.images)?;
        let disc_sr = self.discriminator.forward(&output.synthetic.super_resolved)?;
        let disc_gt = self.discriminator.forward(&synthetic_batch.high_resolution)?;

        let synthetic = RecognitionTerms {
            embeddings: &output.synthetic.embeddings,
            labels: &synthetic_batch.class_ids,
            fc_weights: &output.synthetic.fc_weights,
            num_classes: self.config.num_classes_synthetic,
        };
        let natural = RecognitionTerms {
            embeddings: &output.natural.embeddings,
            labels: &natural_batch.class_ids,
            fc_weights: &output.natural.fc_weights,
            num_classes: num_classes_natural,
        };
        let srfr_loss = self.loss.joint_loss(
            &output.synthetic.super_resolved,
            &synthetic_batch.high_resolution,
            &disc_sr,
            &disc_gt,
            synthetic,
            step,
            Some(natural),
        )?;
        let discriminator_loss = self.loss.discriminator_loss(&disc_sr, &disc_gt)?;

        self.apply_adversarial_update(&srfr_loss, &discriminator_loss)
    }

    /// Differentiate each loss against its own model and apply both updates
    ///
    /// Both gradient sets are extracted before either optimizer mutates a
    /// variable.
    fn apply_adversarial_update(
        &mut self,
        srfr_loss: &candle_core::Tensor,
        discriminator_loss: &candle_core::Tensor,
    ) -> Result<StepLosses> {
        let srfr_grads = GradientTape::new(TapeKind::Generator, self.srfr_optimizer.variables().to_vec())
            .gradient(srfr_loss)?;
        let discriminator_grads = GradientTape::new(
            TapeKind::Discriminator,
            self.discriminator_optimizer.variables().to_vec(),
        )
        .gradient(discriminator_loss)?;

        self.srfr_optimizer.apply_gradients(&srfr_grads)?;
        self.discriminator_optimizer.apply_gradients(&discriminator_grads)?;

        let losses = StepLosses {
            srfr: to_f64(srfr_loss)?,
            discriminator: to_f64(discriminator_loss)?,
        };
        debug!(
            srfr_loss = losses.srfr,
            discriminator_loss = losses.discriminator,
            "Applied adversarial update"
        );
        Ok(losses)
    }

    /// Run one epoch
    ///
    /// With `natural` set, synthetic and natural batches are paired in order
    /// and the epoch stops at the shorter sequence. Any step failure aborts
    /// the epoch.
    #[instrument(skip_all, fields(epoch = self.epoch))]
    pub fn train_epoch(
        &mut self,
        synthetic: &[SyntheticBatch],
        natural: Option<&[NaturalBatch]>,
        srfr_aggregator: &mut dyn LossAggregator,
        discriminator_aggregator: &mut dyn LossAggregator,
    ) -> Result<EpochReport> {
        let started_at = Utc::now();
        let epoch = self.epoch;
        self.send_event(TrainingEvent::EpochStarted {
            epoch,
            timestamp: started_at,
        });
        info!("Starting epoch {}", epoch);

        let steps = match natural {
            Some(natural) => synthetic.len().min(natural.len()),
            None => synthetic.len(),
        };
        if steps == 0 {
            return self.fail(Error::invalid_input("epoch has no batches"));
        }

        let mut srfr_mean = RunningMean::new();
        let mut discriminator_mean = RunningMean::new();
        let mut last = None;

        for step in 0..steps {
            let summary_step = self.global_step;
            let result = match natural {
                Some(natural) => self.train_step_joint(&synthetic[step], &natural[step], summary_step),
                None => self.train_step_synthetic(&synthetic[step], summary_step),
            };
            let losses = match result {
                Ok(losses) => losses,
                Err(e) => return self.fail(e),
            };
            self.global_step += 1;

            srfr_mean.update(losses.srfr);
            discriminator_mean.update(losses.discriminator);
            self.report_progress(step, losses.srfr, Some(losses.discriminator));
            last = Some(losses);
        }

        let Some(last) = last else {
            return self.fail(Error::invalid_input("epoch has no batches"));
        };
        let report = EpochReport {
            loss: srfr_aggregator.update(last.srfr),
            discriminator_loss: Some(discriminator_aggregator.update(last.discriminator)),
            loss_epoch_mean: srfr_mean.result().unwrap_or(last.srfr),
            discriminator_epoch_mean: discriminator_mean.result(),
            steps,
            samples_seen: steps * self.config.batch_size,
            started_at,
            finished_at: Utc::now(),
        };
        self.finish_epoch(report)
    }

    /// Run one epoch of recognition-only training
    ///
    /// Trains `model` with the margin classification loss over natural
    /// batches using `optimizer`, with the same progress cadence and return
    /// semantics as [`SrfrTrainer::train_epoch`].
    #[instrument(skip_all, fields(epoch = self.epoch))]
    pub fn train_recognition_epoch(
        &mut self,
        model: &dyn RecognitionModel,
        optimizer: &mut dyn Optimizer,
        batches: &[NaturalBatch],
        num_classes: usize,
        aggregator: &mut dyn LossAggregator,
    ) -> Result<EpochReport> {
        let started_at = Utc::now();
        let epoch = self.epoch;
        self.send_event(TrainingEvent::EpochStarted {
            epoch,
            timestamp: started_at,
        });

        if batches.is_empty() {
            return self.fail(Error::invalid_input("epoch has no batches"));
        }

        let mut mean = RunningMean::new();
        let mut last = 0.0;
        for (step, batch) in batches.iter().enumerate() {
            let loss = match self.recognition_step(model, optimizer, batch, num_classes) {
                Ok(loss) => loss,
                Err(e) => return self.fail(e),
            };
            self.global_step += 1;
            mean.update(loss);
            self.report_progress(step, loss, None);
            last = loss;
        }

        let report = EpochReport {
            loss: aggregator.update(last),
            discriminator_loss: None,
            loss_epoch_mean: mean.result().unwrap_or(last),
            discriminator_epoch_mean: None,
            steps: batches.len(),
            samples_seen: batches.len() * self.config.batch_size,
            started_at,
            finished_at: Utc::now(),
        };
        self.finish_epoch(report)
    }

    fn recognition_step(
        &self,
        model: &dyn RecognitionModel,
        optimizer: &mut dyn Optimizer,
        batch: &NaturalBatch,
        num_classes: usize,
    ) -> Result<f64> {
        batch.validate()?;
        let (embeddings, fc_weights) = model.forward(&batch.images)?;
        let loss = self.loss.margin_classification_loss(RecognitionTerms {
            embeddings: &embeddings,
            labels: &batch.class_ids,
            fc_weights: &fc_weights,
            num_classes,
        })?;
        let grads = GradientTape::new(TapeKind::Generator, optimizer.variables().to_vec()).gradient(&loss)?;
        optimizer.apply_gradients(&grads)?;
        to_f64(&loss)
    }

    /// Apply the learning rate schedule after `epoch` completes
    ///
    /// Returns the `(srfr, discriminator)` learning rates now in force.
    pub fn on_epoch_end(&mut self, epoch: usize) -> (f64, f64) {
        for optimizer in [&mut self.srfr_optimizer, &mut self.discriminator_optimizer] {
            let current = optimizer.learning_rate();
            let next = self.scheduler.next_lr(current, epoch);
            if next != current {
                optimizer.set_learning_rate(next);
                info!(
                    optimizer = optimizer.name(),
                    from = current,
                    to = next,
                    "Adjusted learning rate after epoch {}",
                    epoch
                );
            }
        }
        let rates = self.learning_rates();
        self.send_event(TrainingEvent::LearningRateChanged {
            epoch,
            learning_rate: rates.0,
        });
        rates
    }

    fn report_progress(&self, step: usize, loss: f64, discriminator_loss: Option<f64>) {
        if step % self.config.log_every_steps != 0 {
            return;
        }
        let samples_seen = (step + 1) * self.config.batch_size;
        match discriminator_loss {
            Some(d_loss) => info!(
                "SRFR training loss (for one batch) at step {}: {:.6}, discriminator: {:.6}, seen {} samples",
                step + 1,
                loss,
                d_loss,
                samples_seen
            ),
            None => info!(
                "Training loss (for one batch) at step {}: {:.6}, seen {} samples",
                step + 1,
                loss,
                samples_seen
            ),
        }
        self.send_event(TrainingEvent::Progress {
            step: step + 1,
            loss,
            discriminator_loss,
            samples_seen,
        });
    }

    fn finish_epoch(&mut self, report: EpochReport) -> Result<EpochReport> {
        info!(
            epoch = self.epoch,
            steps = report.steps,
            loss = report.loss,
            loss_epoch_mean = report.loss_epoch_mean,
            "Epoch completed"
        );
        self.send_event(TrainingEvent::EpochCompleted {
            epoch: self.epoch,
            report: report.clone(),
        });
        self.epoch += 1;
        Ok(report)
    }

    fn fail<T>(&self, e: Error) -> Result<T> {
        error!("Training epoch {} aborted: {}", self.epoch, e);
        self.send_event(TrainingEvent::Error { error: e.to_string() });
        Err(e)
    }

    /// Send training event
    fn send_event(&self, event: TrainingEvent) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.send(event) {
                debug!("Training event receiver dropped: {}", e);
            }
        }
    }
}

/// Epochs needed to run `iterations` optimizer steps over a dataset
///
/// `ceil(iterations / ceil(dataset_len / batch_size))`
pub fn num_epochs_for_iterations(iterations: usize, dataset_len: usize, batch_size: usize) -> Result<usize> {
    if batch_size == 0 {
        return Err(Error::invalid_input("batch_size must be > 0"));
    }
    if dataset_len == 0 {
        return Err(Error::invalid_input("dataset is empty"));
    }
    let steps_per_epoch = dataset_len.div_ceil(batch_size);
    Ok(iterations.div_ceil(steps_per_epoch))
}
