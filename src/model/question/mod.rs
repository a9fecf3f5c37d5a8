//! Question encoders, mapping a token sequence to a fixed-size sentence vector.

pub mod cnn;
pub mod lstm;

pub use cnn::{CnnEncoder, CnnEncoderConfig};
pub use lstm::{LstmEncoder, LstmEncoderConfig};

use crate::error::{DataError, InvalidConfig};
use burn::prelude::*;

#[derive(Module, Debug)]
pub enum QuestionEncoder<B: Backend> {
    Cnn(CnnEncoder<B>),
    Lstm(LstmEncoder<B>),
}

#[derive(Config, Debug)]
pub enum QuestionEncoderConfig {
    Cnn(CnnEncoderConfig),
    Lstm(LstmEncoderConfig),
}

impl QuestionEncoderConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        match self {
            Self::Cnn(config) => config.validate(),
            Self::Lstm(config) => config.validate(),
        }
    }

    /// Size of the sentence vector.
    pub fn output_dim(&self) -> usize {
        match self {
            Self::Cnn(config) => config.output_dim(),
            Self::Lstm(config) => config.output_dim,
        }
    }

    pub fn seq_length(&self) -> usize {
        match self {
            Self::Cnn(config) => config.seq_length,
            Self::Lstm(config) => config.seq_length,
        }
    }

    pub fn vocab_size(&self) -> usize {
        match self {
            Self::Cnn(config) => config.vocab_size,
            Self::Lstm(config) => config.vocab_size,
        }
    }

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> QuestionEncoder<B> {
        match self {
            Self::Cnn(config) => QuestionEncoder::Cnn(config.init(device)),
            Self::Lstm(config) => QuestionEncoder::Lstm(config.init(device)),
        }
    }

    /// Returns the initialized model with a pretrained embedding matrix.
    ///
    /// Only the recurrent encoder takes one; the convolutional encoder ignores it.
    pub fn init_with_embedding<B: Backend>(
        &self,
        matrix: Tensor<B, 2>,
        device: &B::Device,
    ) -> Result<QuestionEncoder<B>, DataError> {
        match self {
            Self::Cnn(config) => {
                tracing::warn!("the convolutional question encoder ignores pretrained embeddings");
                Ok(QuestionEncoder::Cnn(config.init(device)))
            }
            Self::Lstm(config) => Ok(QuestionEncoder::Lstm(
                config.init_with_embedding(matrix, device)?,
            )),
        }
    }
}

impl<B: Backend> QuestionEncoder<B> {
    /// # Shapes
    ///   - Input [batch, seq_length]
    ///   - Output [batch, output_dim]
    pub fn forward(&self, questions: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        match self {
            Self::Cnn(encoder) => encoder.forward(questions),
            Self::Lstm(encoder) => encoder.forward(questions),
        }
    }
}
