use crate::data::{AnswerVocab, DataGenerator};
use crate::error::{DataError, TrainingError};
use crate::model::San;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Predicted answer of one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub answer: String,
    pub question_id: u64,
}

/// Predicts the answer class of every sample of `generator`, by sample index.
pub fn predict_classes<B: Backend>(
    model: &San<B>,
    generator: &DataGenerator,
    num_workers: usize,
    device: &B::Device,
) -> Result<Vec<usize>, TrainingError> {
    let mut classes = vec![0; generator.num_items()];
    let total = generator.len();
    let loader = generator.loader::<B>(num_workers, device);
    for (b, batch) in loader.iter().enumerate() {
        let batch = batch?;
        let predicted = model.predict(batch.questions, batch.images).into_data();
        for (&index, class) in batch.indexes.iter().zip(predicted.iter::<i64>()) {
            classes[index] = class as usize;
        }
        tracing::debug!("predicted {}/{total} batches", b + 1);
    }
    Ok(classes)
}

/// Predicts the answer of every sample of `generator`.
///
/// `question_ids` are aligned with the samples of the generator.
pub fn predict<B: Backend>(
    model: &San<B>,
    generator: &DataGenerator,
    question_ids: &[u64],
    vocab: &AnswerVocab,
    num_workers: usize,
    device: &B::Device,
) -> Result<Vec<Prediction>, TrainingError> {
    if question_ids.len() != generator.num_items() {
        return Err(DataError::LengthMismatch {
            name: "question_ids",
            found: question_ids.len(),
            expected: generator.num_items(),
        }
        .into());
    }

    let classes = predict_classes(model, generator, num_workers, device)?;
    tracing::info!("predicted {} answers", classes.len());
    classes
        .into_iter()
        .zip(question_ids)
        .map(|(class, &question_id)| {
            let answer = vocab
                .answer(class)
                .ok_or(TrainingError::UnknownAnswer { class })?;
            Ok(Prediction {
                answer: answer.to_string(),
                question_id,
            })
        })
        .collect()
}

pub fn save_predictions(path: &Path, predictions: &[Prediction]) -> Result<(), TrainingError> {
    let json = serde_json::to_string(predictions).map_err(|source| TrainingError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("saving {} predictions in {path:?}", predictions.len());
    std::fs::write(path, json).map_err(|source| TrainingError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn predictions_are_a_json_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("predictions.json");
        let predictions = vec![
            Prediction {
                answer: "yes".into(),
                question_id: 42,
            },
            Prediction {
                answer: "2".into(),
                question_id: 7,
            },
        ];
        save_predictions(&path, &predictions).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"answer": "yes", "question_id": 42},
                {"answer": "2", "question_id": 7},
            ])
        );
    }
}
