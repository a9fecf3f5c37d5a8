use burn::module::{Content, DisplaySettings, ModuleDisplay, RunningState};
use burn::prelude::*;

/// Configuration to create a [BatchNorm](BatchNorm) layer.
#[derive(Config, Debug)]
pub struct BatchNormConfig {
    /// The size of the input features.
    pub d_model: usize,
    /// Weight of the previous running statistics on each update.
    #[config(default = 0.99)]
    pub momentum: f64,
    /// A value required for numerical stability.
    #[config(default = 1e-3)]
    pub epsilon: f64,
}

impl BatchNormConfig {
    /// Initialize a new [BatchNorm](BatchNorm) module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BatchNorm<B> {
        assert!(
            (0.0..1.0).contains(&self.momentum),
            "momentum must be in [0, 1)"
        );
        BatchNorm {
            running_mean: RunningState::new(Tensor::zeros([self.d_model], device)),
            running_var: RunningState::new(Tensor::ones([self.d_model], device)),
            momentum: self.momentum,
            epsilon: self.epsilon,
        }
    }
}

/// Batch normalization over the last dimension, without a learned scale or shift.
///
/// `Y = (X - mean) / sqrt(var + epsilon)`
///
/// While training (autodiff backends) the statistics of the batch are used, over every
/// dimension but the last, and folded into the running statistics. Otherwise the running
/// statistics are used.
///
/// Should be created using the [BatchNormConfig](BatchNormConfig) configuration.
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct BatchNorm<B: Backend> {
    pub running_mean: RunningState<Tensor<B, 1>>,
    pub running_var: RunningState<Tensor<B, 1>>,
    pub momentum: f64,
    pub epsilon: f64,
}

impl<B: Backend> BatchNorm<B> {
    /// # Shapes
    /// - input: `[..., any, d_model]`
    /// - output: `[..., any, d_model]`
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let shape = x.dims();
        let d_model = shape[D - 1];
        let rows = shape[..D - 1].iter().product::<usize>();
        let x = x.reshape([rows, d_model]);

        let (mean, var) = if B::ad_enabled() {
            let mean = x.clone().mean_dim(0);
            let centered = x.clone() - mean.clone();
            let var = (centered.clone() * centered).mean_dim(0);
            debug_assert_eq!([1, d_model], var.dims());

            let keep = self.momentum;
            let running_mean = self.running_mean.value_sync();
            let running_var = self.running_var.value_sync();
            self.running_mean.update(
                (running_mean * keep + mean.clone().reshape([d_model]) * (1.0 - keep)).detach(),
            );
            self.running_var.update(
                (running_var * keep + var.clone().reshape([d_model]) * (1.0 - keep)).detach(),
            );
            (mean, var)
        } else {
            (
                self.running_mean.value().reshape([1, d_model]),
                self.running_var.value().reshape([1, d_model]),
            )
        };

        let normalized = (x - mean) / (var + self.epsilon).sqrt();
        normalized.reshape(shape)
    }
}

impl<B: Backend> ModuleDisplay for BatchNorm<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        let [d_model] = self.running_mean.value().dims();
        content
            .add("d_model", &d_model)
            .add("momentum", &self.momentum)
            .add("epsilon", &self.epsilon)
            .optional()
    }
}
