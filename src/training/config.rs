use crate::constants::{
    BATCH_SIZE, CLIP_NORM, DECAY_RATE, DECAY_STEPS, EARLY_STOPPING_PATIENCE, EPOCHS, LR,
};
use burn::grad_clipping::GradientClippingConfig;
use burn::optim::AdamConfig;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Epsilon of the Adam optimizer.
pub const ADAM_EPSILON: f32 = 1e-7;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    /// Epochs to run, counted after the epochs already recorded in the artifacts history.
    #[config(default = "EPOCHS")]
    pub num_epochs: usize,
    #[config(default = "BATCH_SIZE")]
    pub batch_size: usize,
    /// Data loader threads reading feature maps ahead of the training step. `0` loads on
    /// the training thread.
    #[config(default = 6)]
    pub num_workers: usize,
    /// Initial learning rate.
    #[config(default = "LR")]
    pub lr: f64,
    /// Decay of the learning rate over the optimizer steps. The rate stays constant if unset.
    pub lr_decay: Option<ExponentialDecayConfig>,
    /// Stops training once the validation loss stops improving. Runs every epoch if unset.
    pub early_stopping: Option<EarlyStoppingConfig>,
    /// Reshuffles the training samples every epoch.
    #[config(default = true)]
    pub shuffle: bool,
    #[config(default = 0)]
    pub seed: u64,
}

impl TrainingConfig {
    /// Adam with gradient norm clipping and a decaying learning rate, for the convolutional
    /// variant.
    pub fn cnn_2() -> Self {
        let optimizer = optimizer_config()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(CLIP_NORM)));
        Self::new(optimizer).with_lr_decay(Some(ExponentialDecayConfig::new()))
    }

    /// Adam at a constant learning rate with early stopping on the validation loss, for the
    /// recurrent variant.
    pub fn lstm_3() -> Self {
        Self::new(optimizer_config()).with_early_stopping(Some(EarlyStoppingConfig::new()))
    }

    /// Learning rate of the optimizer step `step`, counted from zero over the whole run.
    pub fn lr_at(&self, step: usize) -> f64 {
        match &self.lr_decay {
            Some(decay) => decay.lr(self.lr, step),
            None => self.lr,
        }
    }
}

pub fn optimizer_config() -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(ADAM_EPSILON)
}

/// Multiplies the learning rate by `decay_rate` every `decay_steps` optimizer steps,
/// continuously: `lr * decay_rate ^ (step / decay_steps)`.
#[derive(Config, Debug)]
pub struct ExponentialDecayConfig {
    #[config(default = "DECAY_STEPS")]
    pub decay_steps: usize,
    #[config(default = "DECAY_RATE")]
    pub decay_rate: f64,
    /// Decays in whole intervals of `decay_steps`.
    #[config(default = false)]
    pub staircase: bool,
}

impl ExponentialDecayConfig {
    /// Learning rate for the optimizer step `step`, counted from zero.
    pub fn lr(&self, initial_lr: f64, step: usize) -> f64 {
        assert!(self.decay_steps > 0, "decay_steps must be positive");
        let mut exponent = step as f64 / self.decay_steps as f64;
        if self.staircase {
            exponent = exponent.floor();
        }
        initial_lr * self.decay_rate.powf(exponent)
    }
}

/// Which epoch quantity early stopping watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    ValLoss,
    ValAccuracy,
}

impl Monitor {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ValLoss => "val_loss",
            Self::ValAccuracy => "val_accuracy",
        }
    }

    /// Whether lower values are better.
    pub fn minimizes(&self) -> bool {
        matches!(self, Self::ValLoss)
    }
}

#[derive(Config, Debug)]
pub struct EarlyStoppingConfig {
    #[config(default = "Monitor::ValLoss")]
    pub monitor: Monitor,
    /// Epochs without improvement after which training stops.
    #[config(default = "EARLY_STOPPING_PATIENCE")]
    pub patience: usize,
    /// Smallest change that counts as an improvement.
    #[config(default = 0.0)]
    pub min_delta: f64,
}
