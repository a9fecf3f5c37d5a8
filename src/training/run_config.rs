use crate::error::TrainingError;
use crate::model::{QuestionEncoderConfig, SanConfig};
use crate::training::config::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Human-readable summary of a run, saved next to its checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RunConfig {
    pub name: String,
    /// Source of the question embedding, `"trainable"` when learned from scratch.
    pub embedding: String,
    pub dataset: String,
    pub optimizer: String,
    /// Monitored quantity of early stopping, if enabled.
    #[serde(rename = "EARLY STOPPING")]
    pub early_stopping: Option<String>,
    pub loss: String,
    pub dropout_rate: f64,
    pub embedding_dim: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub seq_length: usize,
    pub num_filters: Option<Vec<usize>>,
    #[serde(rename = "FILTER_SIZE")]
    pub filter_sizes: Option<Vec<usize>>,
    pub attention_dim: usize,
    pub hops: usize,
    pub num_classes: usize,
    pub lr: f64,
}

impl RunConfig {
    pub fn new(
        name: impl Into<String>,
        embedding: impl Into<String>,
        dataset: impl Into<String>,
        model: &SanConfig,
        training: &TrainingConfig,
    ) -> Self {
        let (embedding_dim, num_filters, filter_sizes) = match &model.question {
            QuestionEncoderConfig::Cnn(config) => (
                config.embedding_dim,
                Some(config.num_filters.clone()),
                Some(config.filter_sizes.clone()),
            ),
            QuestionEncoderConfig::Lstm(config) => (config.embedding_dim, None, None),
        };
        Self {
            name: name.into(),
            embedding: embedding.into(),
            dataset: dataset.into(),
            optimizer: "Adam".into(),
            early_stopping: training
                .early_stopping
                .as_ref()
                .map(|config| config.monitor.name().to_string()),
            loss: "categorical_crossentropy".into(),
            dropout_rate: model.dropout,
            embedding_dim,
            epochs: training.num_epochs,
            batch_size: training.batch_size,
            seq_length: model.question.seq_length(),
            num_filters,
            filter_sizes,
            attention_dim: model.attention_dim,
            hops: model.hops,
            num_classes: model.num_classes,
            lr: training.lr,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TrainingError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| TrainingError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("saving run config in {path:?}");
        std::fs::write(path, json).map_err(|source| TrainingError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_upper_case_keys() {
        let model = SanConfig::lstm_3();
        let training = TrainingConfig::lstm_3();
        let config = RunConfig::new("SAN_LSTM_3", "fasttext_300", "english", &model, &training);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["NAME"], "SAN_LSTM_3");
        assert_eq!(json["EARLY STOPPING"], "val_loss");
        assert_eq!(json["LOSS"], "categorical_crossentropy");
        assert_eq!(json["HOPS"], 3);
        assert_eq!(json["SEQ_LENGTH"], 25);
        assert!(json["NUM_FILTERS"].is_null());

        let cnn = RunConfig::new(
            "SAN_CNN_2",
            "trainable",
            "english",
            &SanConfig::cnn_2(),
            &TrainingConfig::cnn_2(),
        );
        let json = serde_json::to_value(&cnn).unwrap();
        assert_eq!(json["FILTER_SIZE"], serde_json::json!([1, 2, 3]));
        assert!(json["EARLY STOPPING"].is_null());
    }
}
