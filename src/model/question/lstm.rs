//! Recurrent question encoder.
//!
//! Two stacked LSTMs read the embedded question; the first one returns every step, the
//! second one only its final state. Each is followed by a batch normalization without
//! learned scale or shift, and a dense `tanh` layer produces the sentence vector.

use crate::constants::{EMBEDDING_DIM, LSTM_UNITS, RECURRENT_DROPOUT, SEQ_LENGTH, VOCAB_SIZE};
use crate::error::{DataError, InvalidConfig};
use crate::model::{check_non_zero, check_rate};
use crate::model::norm::{BatchNorm, BatchNormConfig};
use crate::model::recurrent::{Lstm, LstmConfig};
use burn::module::Param;
use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::prelude::*;

#[derive(Module, Debug)]
pub struct LstmEncoder<B: Backend> {
    /// Input: vocab_size token ids.
    /// Output channel: embedding_dim.
    pub embedding: Embedding<B>,

    /// Input channel: embedding_dim.
    /// Output channel: hidden_dim, for every step.
    pub lstm1: Lstm<B>,
    pub norm1: BatchNorm<B>,
    pub dropout1: Dropout,

    /// Input channel: hidden_dim.
    /// Output channel: hidden_dim, for the last step.
    pub lstm2: Lstm<B>,
    pub norm2: BatchNorm<B>,
    pub dropout2: Dropout,

    /// Input channel: hidden_dim.
    /// Output channel: output_dim.
    pub dense: Linear<B>,
}

#[derive(Config, Debug)]
pub struct LstmEncoderConfig {
    #[config(default = "VOCAB_SIZE")]
    pub vocab_size: usize,
    #[config(default = "EMBEDDING_DIM")]
    pub embedding_dim: usize,
    #[config(default = "SEQ_LENGTH")]
    pub seq_length: usize,
    #[config(default = "LSTM_UNITS")]
    pub hidden_dim: usize,
    /// Size of the sentence vector.
    #[config(default = "LSTM_UNITS")]
    pub output_dim: usize,
    #[config(default = "RECURRENT_DROPOUT")]
    pub recurrent_dropout: f64,
    /// Dropout after each normalization.
    #[config(default = 0.0)]
    pub dropout: f64,
    /// Keeps a pretrained embedding matrix fixed during training.
    #[config(default = false)]
    pub freeze_embedding: bool,
}

impl LstmEncoderConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        check_non_zero("vocab_size", self.vocab_size)?;
        check_non_zero("embedding_dim", self.embedding_dim)?;
        check_non_zero("seq_length", self.seq_length)?;
        check_non_zero("hidden_dim", self.hidden_dim)?;
        check_non_zero("output_dim", self.output_dim)?;
        check_rate("recurrent_dropout", self.recurrent_dropout)?;
        check_rate("dropout", self.dropout)
    }

    /// Returns the initialized model, with a randomly initialized embedding.
    pub fn init<B: Backend>(&self, device: &B::Device) -> LstmEncoder<B> {
        let embedding = EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device);
        self.init_layers(embedding, device)
    }

    /// Returns the initialized model, with the embedding taken from a pretrained matrix.
    ///
    /// # Shapes
    ///   - Input matrix [vocab_size, embedding_dim]
    pub fn init_with_embedding<B: Backend>(
        &self,
        matrix: Tensor<B, 2>,
        device: &B::Device,
    ) -> Result<LstmEncoder<B>, DataError> {
        let expected = [self.vocab_size, self.embedding_dim];
        if matrix.dims() != expected {
            return Err(DataError::EmbeddingShape {
                found: matrix.dims(),
                expected,
            });
        }

        let mut embedding = EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device);
        embedding.weight = Param::from_tensor(matrix.to_device(device));
        let embedding = if self.freeze_embedding {
            embedding.no_grad()
        } else {
            embedding
        };
        Ok(self.init_layers(embedding, device))
    }

    fn init_layers<B: Backend>(
        &self,
        embedding: Embedding<B>,
        device: &B::Device,
    ) -> LstmEncoder<B> {
        LstmEncoder {
            embedding,
            lstm1: LstmConfig::new(self.embedding_dim, self.hidden_dim)
                .with_recurrent_dropout(self.recurrent_dropout)
                .init(device),
            norm1: BatchNormConfig::new(self.hidden_dim).init(device),
            dropout1: DropoutConfig::new(self.dropout).init(),
            lstm2: LstmConfig::new(self.hidden_dim, self.hidden_dim)
                .with_recurrent_dropout(self.recurrent_dropout)
                .init(device),
            norm2: BatchNormConfig::new(self.hidden_dim).init(device),
            dropout2: DropoutConfig::new(self.dropout).init(),
            dense: LinearConfig::new(self.hidden_dim, self.output_dim)
                .with_bias(true)
                .init(device),
        }
    }
}

impl<B: Backend> LstmEncoder<B> {
    /// # Shapes
    ///   - Input [batch, seq_length]
    ///   - Output [batch, output_dim]
    pub fn forward(&self, questions: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, seq_length] = questions.dims();
        let d_hidden = self.lstm1.d_hidden();

        let x = self.embedding.forward(questions);

        let (x, _last) = self.lstm1.forward(x);
        debug_assert_eq!([batch, seq_length, d_hidden], x.dims());
        let x = self.norm1.forward(x);
        let x = self.dropout1.forward(x);

        let (_steps, x) = self.lstm2.forward(x);
        debug_assert_eq!([batch, d_hidden], x.dims());
        let x = self.norm2.forward(x);
        let x = self.dropout2.forward(x);

        self.dense.forward(x).tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;
    type TestAutoBackend = Autodiff<TestBackend>;

    fn config() -> LstmEncoderConfig {
        LstmEncoderConfig::new()
            .with_vocab_size(10)
            .with_embedding_dim(4)
            .with_seq_length(3)
            .with_hidden_dim(6)
            .with_output_dim(5)
    }

    #[test]
    fn encodes_to_the_output_size() {
        let device = Default::default();
        let encoder = config().init::<TestBackend>(&device);
        let questions = Tensor::<TestBackend, 2, Int>::from_ints([[1, 2, 3], [9, 0, 0]], &device);
        let x = encoder.forward(questions);
        assert_eq!([2, 5], x.dims());
    }

    #[test]
    fn pretrained_embedding_must_match_the_vocabulary() {
        let device = Default::default();
        let matrix = Tensor::<TestBackend, 2>::zeros([9, 4], &device);
        let err = config().init_with_embedding(matrix, &device).unwrap_err();
        assert!(matches!(
            err,
            DataError::EmbeddingShape {
                found: [9, 4],
                expected: [10, 4]
            }
        ));
    }

    #[test]
    fn frozen_embedding_gets_no_gradient() {
        let device = Default::default();
        let questions =
            Tensor::<TestAutoBackend, 2, Int>::from_ints([[1, 2, 3], [4, 5, 6]], &device);

        for freeze in [false, true] {
            let matrix =
                Tensor::<TestAutoBackend, 2>::random([10, 4], Distribution::Default, &device);
            let encoder = config()
                .with_freeze_embedding(freeze)
                .init_with_embedding(matrix, &device)
                .unwrap();
            let grads = encoder.forward(questions.clone()).sum().backward();
            assert_eq!(encoder.embedding.weight.grad(&grads).is_none(), freeze);
            assert!(encoder.dense.weight.grad(&grads).is_some());
        }
    }
}
