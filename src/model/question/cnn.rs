//! Convolutional question encoder.
//!
//! Filters of several widths slide over the embedded tokens; each filter keeps its strongest
//! response over the whole question, and the responses of all filter banks are concatenated.

use crate::constants::{
    DROPOUT_RATE, EMBEDDING_DIM, FILTER_SIZES, NUM_FILTERS, SEQ_LENGTH, VOCAB_SIZE,
};
use crate::error::InvalidConfig;
use crate::model::{check_non_zero, check_rate};
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig};
use burn::prelude::*;

#[derive(Module, Debug)]
pub struct CnnEncoder<B: Backend> {
    /// Input: vocab_size token ids.
    /// Output channel: embedding_dim.
    pub embedding: Embedding<B>,

    /// One bank per filter size.
    ///
    /// Input channel: embedding_dim.
    /// Output channel: num_filters[i].
    /// Kernel: filter_sizes[i].
    pub convs: Vec<Conv1d<B>>,

    pub dropout: Dropout,
}

#[derive(Config, Debug)]
pub struct CnnEncoderConfig {
    #[config(default = "VOCAB_SIZE")]
    pub vocab_size: usize,
    #[config(default = "EMBEDDING_DIM")]
    pub embedding_dim: usize,
    #[config(default = "SEQ_LENGTH")]
    pub seq_length: usize,
    #[config(default = "FILTER_SIZES.to_vec()")]
    pub filter_sizes: Vec<usize>,
    #[config(default = "NUM_FILTERS.to_vec()")]
    pub num_filters: Vec<usize>,
    #[config(default = "DROPOUT_RATE")]
    pub dropout: f64,
}

impl CnnEncoderConfig {
    /// Size of the sentence vector.
    pub fn output_dim(&self) -> usize {
        self.num_filters.iter().sum()
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        check_non_zero("vocab_size", self.vocab_size)?;
        check_non_zero("embedding_dim", self.embedding_dim)?;
        check_non_zero("seq_length", self.seq_length)?;
        if self.filter_sizes.len() != self.num_filters.len() {
            return Err(InvalidConfig::FilterCount {
                filter_sizes: self.filter_sizes.len(),
                num_filters: self.num_filters.len(),
            });
        }
        check_non_zero("filter_sizes", self.filter_sizes.len())?;
        for &filter_size in &self.filter_sizes {
            if !(1..=self.seq_length).contains(&filter_size) {
                return Err(InvalidConfig::FilterSize {
                    filter_size,
                    seq_length: self.seq_length,
                });
            }
        }
        for &filters in &self.num_filters {
            check_non_zero("num_filters", filters)?;
        }
        check_rate("dropout", self.dropout)
    }

    /// Returns the initialized model.
    ///
    /// # Panics
    /// If the config does not [validate](Self::validate).
    pub fn init<B: Backend>(&self, device: &B::Device) -> CnnEncoder<B> {
        if let Err(error) = self.validate() {
            panic!("invalid convolutional encoder config: {error}");
        }

        let convs = self
            .filter_sizes
            .iter()
            .zip(&self.num_filters)
            .map(|(&size, &filters)| {
                Conv1dConfig::new(self.embedding_dim, filters, size).init(device)
            })
            .collect();

        CnnEncoder {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device),
            convs,
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

impl<B: Backend> CnnEncoder<B> {
    /// # Shapes
    ///   - Input [batch, seq_length]
    ///   - Output [batch, sum(num_filters)]
    pub fn forward(&self, questions: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, seq_length] = questions.dims();

        let x = self.embedding.forward(questions);
        let [_batch, _seq_length, embedding_dim] = x.dims();
        // channels first for the convolutions
        let x = x.swap_dims(1, 2);
        debug_assert_eq!([batch, embedding_dim, seq_length], x.dims());

        let pooled = self
            .convs
            .iter()
            .map(|conv| {
                let y = conv.forward(x.clone()).tanh();
                let [_batch, filters, _steps] = y.dims();
                y.max_dim(2).reshape([batch, filters])
            })
            .collect();
        let x = Tensor::cat(pooled, 1);

        self.dropout.forward(x)
    }
}
