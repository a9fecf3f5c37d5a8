//! Model and run constants, used as the defaults of the various configs.

/// Number of tokens in a padded/truncated question.
pub const SEQ_LENGTH: usize = 25;
/// Number of distinct question tokens (including the padding token `0`).
pub const VOCAB_SIZE: usize = 15_000;
/// Size of a token embedding (matches the fasttext 300-d vectors).
pub const EMBEDDING_DIM: usize = 300;
/// Number of answer classes.
pub const NUM_CLASSES: usize = 1_000;

/// Convolution widths of the convolutional question encoder.
pub const FILTER_SIZES: [usize; 3] = [1, 2, 3];
/// Output channels of each convolution, aligned with [`FILTER_SIZES`].
pub const NUM_FILTERS: [usize; 3] = [128, 256, 256];
/// Hidden size of both recurrent layers of the recurrent question encoder.
pub const LSTM_UNITS: usize = 1024;
/// Dropout applied to the recurrent state of the recurrent question encoder.
pub const RECURRENT_DROPOUT: f64 = 0.5;

/// Hidden size of the attention scoring layers.
pub const ATTENTION_DIM: usize = 512;
pub const DROPOUT_RATE: f64 = 0.5;

/// Channels of the precomputed image feature maps.
pub const IMAGE_CHANNELS: usize = 512;
/// Height and width of the precomputed image feature maps.
pub const IMAGE_GRID: usize = 14;
/// Number of image regions, `IMAGE_GRID * IMAGE_GRID`.
pub const NUM_REGIONS: usize = IMAGE_GRID * IMAGE_GRID;

pub const BATCH_SIZE: usize = 64;
pub const EPOCHS: usize = 20;
pub const LR: f64 = 1e-3;

/// Exponential learning rate decay: `lr * DECAY_RATE ^ (step / DECAY_STEPS)`.
pub const DECAY_STEPS: usize = 10_000;
pub const DECAY_RATE: f64 = 0.99997592083;
/// Maximum norm of the gradient of each parameter.
pub const CLIP_NORM: f32 = 10.0;
/// Epochs without validation loss improvement before stopping.
pub const EARLY_STOPPING_PATIENCE: usize = 3;
