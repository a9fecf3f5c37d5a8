use burn::config::ConfigError;
use burn::record::RecorderError;
use std::path::PathBuf;
use std::sync::Arc;

/// Failures while assembling batches.
///
/// Cloneable, so that a failed sample can travel through the data loader as a batch item.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DataError {
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("failed to read the npy array at {path:?}")]
    Npy {
        path: PathBuf,
        #[source]
        source: Arc<ndarray_npy::ReadNpyError>,
    },
    #[error("failed to parse the json file at {path:?}")]
    Json {
        path: PathBuf,
        #[source]
        source: Arc<serde_json::Error>,
    },
    #[error(transparent)]
    Reshape(#[from] ndarray::ShapeError),
    #[error("feature map {path:?} has shape {found:?}, expected {expected:?}")]
    FeatureShape {
        path: PathBuf,
        found: Vec<usize>,
        expected: [usize; 3],
    },
    #[error("no image path for image id {image_id} (question index {index})")]
    MissingImagePath { image_id: u64, index: usize },
    #[error("{name} has {found} entries, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("question {index} has {found} tokens, expected {expected}")]
    QuestionLength {
        index: usize,
        found: usize,
        expected: usize,
    },
    #[error("token {token} of question {index} is outside the vocabulary of size {vocab_size}")]
    TokenOutOfRange {
        index: usize,
        token: u32,
        vocab_size: usize,
    },
    #[error("answer {answer} of sample {index} is outside the {num_classes} classes")]
    AnswerOutOfRange {
        index: usize,
        answer: usize,
        num_classes: usize,
    },
    #[error("embedding matrix has shape {found:?}, expected {expected:?}")]
    EmbeddingShape {
        found: [usize; 2],
        expected: [usize; 2],
    },
    #[error("answer row {index} is not one-hot")]
    NotOneHot { index: usize },
    #[error("batch size must be non-zero")]
    ZeroBatchSize,
    #[error("batch {index} requested, but an epoch only has {len} batches")]
    BatchOutOfRange { index: usize, len: usize },
}

/// A model configuration that cannot be initialized.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidConfig {
    #[error("{name} must be non-zero")]
    Zero { name: &'static str },
    #[error("{name} {rate} must be in [0, 1)")]
    Rate { name: &'static str, rate: f64 },
    #[error("{filter_sizes} filter sizes for {num_filters} filter counts")]
    FilterCount {
        filter_sizes: usize,
        num_filters: usize,
    },
    #[error("filter size {filter_size} must be in [1, {seq_length}]")]
    FilterSize {
        filter_size: usize,
        seq_length: usize,
    },
}

/// Failures while training or running inference.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("failed to write {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {path:?}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load the config at {path:?}: {error:?}")]
    Config { path: PathBuf, error: ConfigError },
    #[error("failed to save or load the model record: {0:?}")]
    Recorder(RecorderError),
    #[error("non-finite loss {loss} at epoch {epoch}, batch {batch}")]
    NonFiniteLoss { loss: f64, epoch: usize, batch: usize },
    #[error("predicted class {class} has no entry in the answer vocabulary")]
    UnknownAnswer { class: usize },
}

impl From<RecorderError> for TrainingError {
    fn from(err: RecorderError) -> Self {
        Self::Recorder(err)
    }
}
