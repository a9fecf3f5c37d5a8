mod batcher;
mod features;
mod generator;
mod input;

pub use batcher::{VqaBatch, VqaBatcher, VqaItem};
pub use features::{
    FeatureShape, grid_to_regions, load_embedding_matrix, load_feature_map, regions_to_grid,
};
pub use generator::{
    DataGenerator, DataGeneratorConfig, EpochDataset, SampleTable, VqaDataLoader, batch_bounds,
    from_one_hot,
};
pub use input::{
    ANSWER_VOCAB_NAME, AnswerVocab, IMAGE_PATHS_NAME, TRAIN_SPLIT_NAME, VALID_SPLIT_NAME,
    VqaSplit, load_image_paths,
};
