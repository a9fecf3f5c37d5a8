pub mod constants;
pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub mod prelude {
    pub use crate::constants::*;
    pub use crate::data::{
        AnswerVocab, DataGenerator, DataGeneratorConfig, FeatureShape, VqaBatch, VqaBatcher,
        VqaItem, VqaSplit,
    };
    pub use crate::error::{DataError, TrainingError};
    pub use crate::model::{
        AttentionStack, AttentionStackConfig, QuestionEncoder, QuestionEncoderConfig, San,
        SanConfig,
    };
    pub use crate::training::{Artifacts, History, Prediction, TrainingConfig};
}
