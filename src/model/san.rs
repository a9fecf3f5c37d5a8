//! The stacked attention network: question and image encoders, the attention stack and the
//! answer classifier.

use crate::constants::{ATTENTION_DIM, DROPOUT_RATE, IMAGE_CHANNELS, IMAGE_GRID, NUM_CLASSES};
use crate::data::{DataGeneratorConfig, FeatureShape, VqaBatch};
use crate::error::{DataError, InvalidConfig};
use crate::model::attention::{AttentionLayerConfig, AttentionStack, AttentionStackConfig};
use crate::model::image::{ImageEncoder, ImageEncoderConfig};
use crate::model::{check_non_zero, check_rate};
use crate::model::question::{
    CnnEncoderConfig, LstmEncoderConfig, QuestionEncoder, QuestionEncoderConfig,
};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::train::ClassificationOutput;

#[derive(Module, Debug)]
pub struct San<B: Backend> {
    pub question: QuestionEncoder<B>,
    pub image: ImageEncoder<B>,
    pub attention: AttentionStack<B>,
    pub dropout: Dropout,

    /// Input channel: embed_dim.
    /// Output channel: num_classes.
    pub classifier: Linear<B>,
}

#[derive(Config, Debug)]
pub struct SanConfig {
    pub question: QuestionEncoderConfig,
    /// Channels of the image feature map.
    #[config(default = "IMAGE_CHANNELS")]
    pub image_channels: usize,
    /// Number of attention hops.
    #[config(default = 2)]
    pub hops: usize,
    #[config(default = "ATTENTION_DIM")]
    pub attention_dim: usize,
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
    /// Dropout on the attended query, before the classifier.
    #[config(default = 0.0)]
    pub dropout: f64,
    /// Dropout on the hidden attention activations.
    #[config(default = 0.0)]
    pub attention_dropout: f64,
}

impl SanConfig {
    /// Convolutional question encoder with two attention hops.
    pub fn cnn_2() -> Self {
        Self::new(QuestionEncoderConfig::Cnn(CnnEncoderConfig::new())).with_hops(2)
    }

    /// Recurrent question encoder with three attention hops.
    pub fn lstm_3() -> Self {
        Self::new(QuestionEncoderConfig::Lstm(LstmEncoderConfig::new()))
            .with_hops(3)
            .with_dropout(DROPOUT_RATE)
    }

    /// Checks the sizes and rates of the whole network, so that [`init`](Self::init) cannot
    /// panic on them.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.question.validate()?;
        check_non_zero("image_channels", self.image_channels)?;
        check_non_zero("hops", self.hops)?;
        check_non_zero("attention_dim", self.attention_dim)?;
        check_non_zero("num_classes", self.num_classes)?;
        check_rate("dropout", self.dropout)?;
        check_rate("attention_dropout", self.attention_dropout)
    }

    /// Size shared by the sentence vector, the region embeddings and the attention query.
    pub fn embed_dim(&self) -> usize {
        self.question.output_dim()
    }

    /// Generator settings whose samples fit this model.
    pub fn generator_config(
        &self,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> DataGeneratorConfig {
        DataGeneratorConfig {
            seq_length: self.question.seq_length(),
            vocab_size: self.question.vocab_size(),
            num_classes: self.num_classes,
            batch_size,
            shuffle,
            seed,
            feature_shape: FeatureShape::new(self.image_channels, IMAGE_GRID, IMAGE_GRID),
        }
    }

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> San<B> {
        self.init_with_question(self.question.init(device), device)
    }

    /// Returns the initialized model, with the question embedding taken from a pretrained
    /// matrix.
    ///
    /// # Shapes
    ///   - Input matrix [vocab_size, embedding_dim]
    pub fn init_with_question_embedding<B: Backend>(
        &self,
        matrix: Tensor<B, 2>,
        device: &B::Device,
    ) -> Result<San<B>, DataError> {
        let question = self.question.init_with_embedding(matrix, device)?;
        Ok(self.init_with_question(question, device))
    }

    fn init_with_question<B: Backend>(
        &self,
        question: QuestionEncoder<B>,
        device: &B::Device,
    ) -> San<B> {
        let embed_dim = self.embed_dim();
        San {
            question,
            image: ImageEncoderConfig::new(embed_dim)
                .with_channels(self.image_channels)
                .init(device),
            attention: AttentionStackConfig::new(
                AttentionLayerConfig::new(embed_dim)
                    .with_attention_dim(self.attention_dim)
                    .with_dropout(self.attention_dropout),
            )
            .with_hops(self.hops)
            .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            classifier: LinearConfig::new(embed_dim, self.num_classes)
                .with_bias(true)
                .init(device),
        }
    }
}

/// Logits together with the attention weights of every hop.
#[derive(Debug, Clone)]
pub struct SanOutput<B: Backend> {
    /// # Shape
    /// [batch, num_classes]
    pub logits: Tensor<B, 2>,
    /// # Shape
    /// [hops] x [batch, regions]
    pub attention: Vec<Tensor<B, 2>>,
}

impl<B: Backend> San<B> {
    /// # Shapes
    ///   - Input questions [batch, seq_length]
    ///   - Input images [batch, regions, channels]
    ///   - Output [batch, num_classes]
    pub fn forward(&self, questions: Tensor<B, 2, Int>, images: Tensor<B, 3>) -> Tensor<B, 2> {
        self.forward_with_attention(questions, images).logits
    }

    /// # Shapes
    ///   - Input questions [batch, seq_length]
    ///   - Input images [batch, regions, channels]
    ///   - Output.logits [batch, num_classes]
    ///   - Output.attention [hops] x [batch, regions]
    pub fn forward_with_attention(
        &self,
        questions: Tensor<B, 2, Int>,
        images: Tensor<B, 3>,
    ) -> SanOutput<B> {
        let [batch, _seq_length] = questions.dims();
        let [images_batch, regions, _channels] = images.dims();
        assert_eq!(batch, images_batch);

        let query = self.question.forward(questions);
        let [_batch, embed_dim] = query.dims();
        let regions_embed = self.image.forward(images);
        debug_assert_eq!([batch, regions, embed_dim], regions_embed.dims());

        let (query, attention) = self.attention.forward(regions_embed, query);
        let query = self.dropout.forward(query);
        let logits = self.classifier.forward(query);

        SanOutput { logits, attention }
    }

    /// Categorical cross entropy of the logits against the one-hot answers.
    ///
    /// # Shapes
    ///   - Input logits [batch, num_classes]
    ///   - Input answers [batch, num_classes]
    ///   - Output [1]
    pub fn loss(&self, logits: Tensor<B, 2>, answers: Tensor<B, 2>) -> Tensor<B, 1> {
        assert_eq!(logits.dims(), answers.dims());
        let log_probs = log_softmax(logits, 1);
        (answers * log_probs).sum_dim(1).mean().neg()
    }

    pub fn forward_classification(&self, batch: VqaBatch<B>) -> ClassificationOutput<B> {
        let logits = self.forward(batch.questions, batch.images);
        let loss = self.loss(logits.clone(), batch.answers);
        ClassificationOutput::new(loss, logits, batch.targets)
    }

    /// Most likely answer class of each question.
    ///
    /// # Shapes
    ///   - Input questions [batch, seq_length]
    ///   - Input images [batch, regions, channels]
    ///   - Output [batch]
    pub fn predict(
        &self,
        questions: Tensor<B, 2, Int>,
        images: Tensor<B, 3>,
    ) -> Tensor<B, 1, Int> {
        let [batch, _seq_length] = questions.dims();
        self.forward(questions, images).argmax(1).reshape([batch])
    }
}
