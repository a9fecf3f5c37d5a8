//! Long short-term memory layer with recurrent dropout.
//!
//! The recurrent dropout mask is sampled once per sequence and applied to the hidden
//! state fed back into the gates at every step (Gal & Ghahramani, "A Theoretically
//! Grounded Application of Dropout in Recurrent Neural Networks").

use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn::tensor::activation::sigmoid;

#[derive(Module, Debug)]
pub struct Lstm<B: Backend> {
    /// Input channel: d_input.
    /// Output channel: 4 * d_hidden, gates ordered as input, forget, cell, output.
    pub input_gates: Linear<B>,

    /// Input channel: d_hidden.
    /// Output channel: 4 * d_hidden.
    pub hidden_gates: Linear<B>,

    /// Probability of dropping a hidden unit of the recurrent state, during training.
    pub recurrent_dropout: f64,
}

#[derive(Config, Debug)]
pub struct LstmConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    #[config(default = 0.0)]
    pub recurrent_dropout: f64,
}

impl LstmConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Lstm<B> {
        assert!(
            (0.0..1.0).contains(&self.recurrent_dropout),
            "recurrent dropout must be in [0, 1)"
        );
        let d_gates = 4 * self.d_hidden;

        let input_gates = {
            let linear: Linear<B> = LinearConfig::new(self.d_input, d_gates)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device);
            // forget gate starts open
            let bias: Tensor<B, 1> = Tensor::cat(
                vec![
                    Tensor::zeros([self.d_hidden], device),
                    Tensor::ones([self.d_hidden], device),
                    Tensor::zeros([2 * self.d_hidden], device),
                ],
                0,
            );
            debug_assert_eq!([d_gates], bias.dims());
            Linear {
                weight: linear.weight,
                bias: Some(burn::module::Param::from_tensor(bias)),
            }
        };

        Lstm {
            input_gates,
            hidden_gates: LinearConfig::new(self.d_hidden, d_gates)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            recurrent_dropout: self.recurrent_dropout,
        }
    }
}

impl<B: Backend> Lstm<B> {
    pub fn d_hidden(&self) -> usize {
        let [d_hidden, _d_gates] = self.hidden_gates.weight.dims();
        d_hidden
    }

    /// Runs the layer over a whole sequence, starting from a zero state.
    ///
    /// # Shapes
    ///   - Input [batch, sequence, d_input]
    ///   - Output.0 [batch, sequence, d_hidden], the hidden state of every step
    ///   - Output.1 [batch, d_hidden], the hidden state of the last step
    pub fn forward(&self, x: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let device = &x.device();
        let [batch, sequence, _d_input] = x.dims();
        let d_hidden = self.d_hidden();
        assert!(sequence > 0, "cannot run over an empty sequence");

        // the input contribution of all steps at once
        let x_gates = self.input_gates.forward(x);
        debug_assert_eq!([batch, sequence, 4 * d_hidden], x_gates.dims());

        let mask = if B::ad_enabled() && self.recurrent_dropout > 0.0 {
            let keep = 1.0 - self.recurrent_dropout;
            let mask =
                Tensor::<B, 2>::random([batch, d_hidden], Distribution::Bernoulli(keep), device);
            Some(mask / keep)
        } else {
            None
        };

        let mut h = Tensor::<B, 2>::zeros([batch, d_hidden], device);
        let mut c = Tensor::<B, 2>::zeros([batch, d_hidden], device);
        let mut outputs = Vec::with_capacity(sequence);
        for t in 0..sequence {
            let x_t = x_gates.clone().narrow(1, t, 1).reshape([batch, 4 * d_hidden]);
            let h_in = match &mask {
                Some(mask) => h.clone() * mask.clone(),
                None => h.clone(),
            };
            let gates = x_t + self.hidden_gates.forward(h_in);
            debug_assert_eq!([batch, 4 * d_hidden], gates.dims());

            // gate order: input, forget, cell, output
            let gate = |k: usize| gates.clone().narrow(1, k * d_hidden, d_hidden);
            let i = sigmoid(gate(0));
            let f = sigmoid(gate(1));
            let g = gate(2).tanh();
            let o = sigmoid(gate(3));

            c = f * c + i * g;
            h = o * c.clone().tanh();
            debug_assert_eq!([batch, d_hidden], h.dims());
            outputs.push(h.clone().unsqueeze_dim(1));
        }

        let outputs = Tensor::cat(outputs, 1);
        debug_assert_eq!([batch, sequence, d_hidden], outputs.dims());
        (outputs, h)
    }
}
