//! Training driver: epoch loop, validation, checkpointing and early stopping.

pub mod checkpoint;
pub mod config;
pub mod early_stopping;
pub mod history;
pub mod predict;
pub mod run_config;

pub use checkpoint::{
    Artifacts, HISTORY_NAME, MODEL_CONFIG_NAME, MODEL_NAME, OPTIM_NAME, PREDICTIONS_NAME,
    RUN_CONFIG_NAME, TRAINING_CONFIG_NAME, checkpoint_name, load_config,
};
pub use config::{
    ADAM_EPSILON, EarlyStoppingConfig, ExponentialDecayConfig, Monitor, TrainingConfig,
    optimizer_config,
};
pub use early_stopping::EarlyStopping;
pub use history::{EpochMetrics, History};
pub use predict::{Prediction, predict, predict_classes, save_predictions};
pub use run_config::RunConfig;

use crate::data::DataGenerator;
use crate::error::TrainingError;
use crate::model::San;
use crate::utils::scalar;
use burn::data::dataloader::Progress;
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::{AccuracyMetric, Adaptor, LossMetric, Metric, MetricMetadata, Numeric};

/// Averaged metrics of one pass over a generator. The accuracy is a fraction in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Result of [`train`].
#[derive(Debug)]
pub struct Trained<B: AutodiffBackend> {
    pub model: San<B>,
    pub history: History,
    /// Epoch at which early stopping ended training, if it did.
    pub stopped_at: Option<usize>,
}

/// Fits `model` on `train_data` for `num_epochs` more epochs, validating on `valid_data`
/// after every epoch.
///
/// A run with a history in `artifacts` resumes it: epochs are numbered after the recorded
/// ones, the decay step counter continues and early stopping replays the recorded values.
/// A fresh run saves the initial weights as checkpoint `0`. The weights after each epoch are
/// saved as checkpoint `epoch`, and the model, optimizer and history are saved after every
/// epoch, so an interrupted run keeps its last completed epoch.
pub fn train<AutoB: AutodiffBackend>(
    artifacts: &Artifacts,
    training_config: &TrainingConfig,
    model: San<AutoB>,
    train_data: &mut DataGenerator,
    valid_data: &DataGenerator,
    device: &AutoB::Device,
) -> Result<Trained<AutoB>, TrainingError> {
    AutoB::seed(device, training_config.seed);

    let optim = training_config.optimizer.init::<AutoB, San<AutoB>>();
    let mut optim = artifacts.load_optim::<AutoB, San<AutoB>, _>(optim, device)?;
    let mut model = model;

    let history_path = artifacts.path(HISTORY_NAME);
    let mut history = if history_path.exists() {
        History::load(&history_path)?
    } else {
        History::default()
    };
    let first_epoch = history.len() + 1;
    let last_epoch = history.len() + training_config.num_epochs;
    if history.is_empty() {
        artifacts.save_checkpoint::<AutoB>(&model, 0)?;
    } else {
        tracing::info!("resuming after epoch {}", history.len());
    }

    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, train_data.num_items()),
        epoch: first_epoch,
        epoch_total: last_epoch,
        iteration: history.len() * train_data.len(),
        lr: Some(training_config.lr),
    };
    let mut early_stopping = training_config.early_stopping.as_ref().map(|config| {
        let mut early_stopping = EarlyStopping::new(config);
        let recorded = history.monitored(early_stopping.monitor());
        for (i, &value) in recorded.iter().enumerate() {
            early_stopping.update(i + 1, value);
        }
        early_stopping
    });
    let mut stopped_at = None;

    tracing::info!(
        "training on {} samples, validating on {} samples",
        train_data.num_items(),
        valid_data.num_items()
    );
    for epoch in first_epoch..last_epoch + 1 {
        metric_meta.epoch = epoch;
        metric_meta.progress = Progress::new(0, train_data.num_items());

        let (trained, train_metrics) = epoch_train(
            train_data,
            model,
            training_config,
            &mut optim,
            &mut metric_meta,
            device,
        )?;
        model = trained;

        let valid_metrics = epoch_valid::<AutoB::InnerBackend>(
            valid_data,
            model.valid(),
            training_config,
            &metric_meta,
            device,
        )?;

        let metrics = EpochMetrics {
            loss: train_metrics.loss,
            accuracy: train_metrics.accuracy,
            val_loss: valid_metrics.loss,
            val_accuracy: valid_metrics.accuracy,
        };
        history.push(metrics);
        tracing::info!(
            "Epoch {epoch}/{last_epoch}, loss {:.4}, acc {:.4}, val_loss {:.4}, val_acc {:.4}",
            metrics.loss,
            metrics.accuracy,
            metrics.val_loss,
            metrics.val_accuracy,
        );

        // save assets
        artifacts.save_checkpoint::<AutoB>(&model, epoch)?;
        artifacts.save_model::<AutoB>(&model, MODEL_NAME)?;
        artifacts.save_optim::<AutoB, San<AutoB>, _>(&optim)?;
        history.save(&artifacts.path(HISTORY_NAME))?;

        train_data.on_epoch_end();

        if let Some(early_stopping) = &mut early_stopping {
            let value = match early_stopping.monitor() {
                Monitor::ValLoss => metrics.val_loss,
                Monitor::ValAccuracy => metrics.val_accuracy,
            };
            if early_stopping.update(epoch, value) {
                if let Some((best, best_epoch)) = early_stopping.best() {
                    tracing::info!(
                        "early stopping at epoch {epoch}: best {} {best:.4} at epoch {best_epoch}",
                        early_stopping.monitor().name()
                    );
                }
                stopped_at = Some(epoch);
                break;
            }
        }
    }
    tracing::info!("training finished");

    Ok(Trained {
        model,
        history,
        stopped_at,
    })
}

/// One pass over the training generator, with an optimizer step per batch.
pub fn epoch_train<AutoB: AutodiffBackend, O: Optimizer<San<AutoB>, AutoB>>(
    train_data: &DataGenerator,
    training_model: San<AutoB>,
    training_config: &TrainingConfig,
    optim: &mut O,
    metric_meta: &mut MetricMetadata,
    device: &AutoB::Device,
) -> Result<(San<AutoB>, PassMetrics), TrainingError> {
    let mut loss_metric = LossMetric::<AutoB>::new();
    let mut acc_metric = AccuracyMetric::<AutoB>::new();
    let mut training_model = training_model;

    let num_batches = train_data.len();
    let loader = train_data.loader::<AutoB>(training_config.num_workers, device);

    // training loop
    for (mut b, batch) in loader.iter().enumerate() {
        b += 1;
        let batch = batch?;
        let batch_size = batch.len();

        let lr = training_config.lr_at(metric_meta.iteration);
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;
        metric_meta.lr = Some(lr);

        let pre_metrics = training_model.forward_classification(batch);
        let loss = scalar(pre_metrics.loss.clone());
        if !loss.is_finite() {
            return Err(TrainingError::NonFiniteLoss {
                loss,
                epoch: metric_meta.epoch,
                batch: b,
            });
        }
        acc_metric.update(&pre_metrics.adapt(), metric_meta);
        loss_metric.update(&pre_metrics.adapt(), metric_meta);

        let grads = pre_metrics.loss.backward();
        let grads = GradientsParams::from_grads(grads, &training_model);
        training_model = optim.step(lr, training_model, grads);

        tracing::debug!(
            "Epoch {}/{}, Batch {b:0>4}/{num_batches}, Loss {:.4}, Acc {:0>6.2}, Lr {lr:.3e}",
            metric_meta.epoch,
            metric_meta.epoch_total,
            loss_metric.value().current(),
            acc_metric.value().current(),
        );
    }

    let metrics = PassMetrics {
        loss: loss_metric.running_value().current(),
        accuracy: acc_metric.running_value().current() / 100.0,
    };
    Ok((training_model, metrics))
}

/// One pass over the validation generator, without gradients.
///
/// `train_meta` is the metadata of the training pass of the same epoch.
pub fn epoch_valid<B: Backend>(
    valid_data: &DataGenerator,
    valid_model: San<B>,
    training_config: &TrainingConfig,
    train_meta: &MetricMetadata,
    device: &B::Device,
) -> Result<PassMetrics, TrainingError> {
    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, valid_data.num_items()),
        epoch: train_meta.epoch,
        epoch_total: train_meta.epoch_total,
        iteration: 0,
        lr: None,
    };
    let mut loss_metric = LossMetric::<B>::new();
    let mut acc_metric = AccuracyMetric::<B>::new();

    let loader = valid_data.loader::<B>(training_config.num_workers, device);

    // validation loop
    for batch in loader.iter() {
        let batch = batch?;
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch.len();

        let pre_metrics = valid_model.forward_classification(batch);
        acc_metric.update(&pre_metrics.adapt(), &metric_meta);
        loss_metric.update(&pre_metrics.adapt(), &metric_meta);
    }

    let metrics = PassMetrics {
        loss: loss_metric.running_value().current(),
        accuracy: acc_metric.running_value().current() / 100.0,
    };
    tracing::debug!(
        "Epoch {}/{}, Avg Valid Loss {:.4}, Avg Valid Acc {:.4}",
        metric_meta.epoch,
        metric_meta.epoch_total,
        metrics.loss,
        metrics.accuracy,
    );
    Ok(metrics)
}
