//! Pre-built inputs: tokenized splits, the image path table and the answer vocabulary.

use crate::data::generator::{DataGenerator, DataGeneratorConfig, from_one_hot};
use crate::error::DataError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const TRAIN_SPLIT_NAME: &str = "train.json";
pub const VALID_SPLIT_NAME: &str = "val.json";
pub const IMAGE_PATHS_NAME: &str = "image_paths.json";
pub const ANSWER_VOCAB_NAME: &str = "answer_vocab.json";

/// A tokenized question/answer split, with arrays aligned by position.
#[derive(Debug, Clone, Serialize)]
pub struct VqaSplit {
    pub question_ids: Vec<u64>,
    /// # Shape
    /// [num_items, seq_length]
    pub questions: Vec<Vec<u32>>,
    pub image_ids: Vec<u64>,
    /// Answer classes.
    pub answers: Vec<usize>,
}

/// Split file contents. Answers are stored either as classes or as one-hot rows.
#[derive(Debug, Deserialize)]
struct SplitFile {
    question_ids: Vec<u64>,
    questions: Vec<Vec<u32>>,
    image_ids: Vec<u64>,
    answers: AnswersFile,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnswersFile {
    Classes(Vec<usize>),
    OneHot(Vec<Vec<f32>>),
}

impl VqaSplit {
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file: SplitFile = read_json(path)?;
        let answers = match file.answers {
            AnswersFile::Classes(classes) => classes,
            AnswersFile::OneHot(rows) => from_one_hot(&rows)?,
        };
        Ok(Self {
            question_ids: file.question_ids,
            questions: file.questions,
            image_ids: file.image_ids,
            answers,
        })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Builds a generator over the samples of this split, keeping the question ids aside.
    pub fn into_generator(
        self,
        image_paths: HashMap<u64, PathBuf>,
        config: &DataGeneratorConfig,
    ) -> Result<(DataGenerator, Vec<u64>), DataError> {
        let generator =
            DataGenerator::new(self.questions, self.image_ids, image_paths, self.answers, config)?;
        Ok((generator, self.question_ids))
    }
}

/// Loads the image id → feature file table.
///
/// Relative paths are resolved against the directory of the table file.
pub fn load_image_paths(path: &Path) -> Result<HashMap<u64, PathBuf>, DataError> {
    let table: HashMap<u64, PathBuf> = read_json(path)?;
    let base = path.parent().unwrap_or(Path::new(""));
    Ok(table
        .into_iter()
        .map(|(id, image)| {
            let image = if image.is_relative() {
                base.join(image)
            } else {
                image
            };
            (id, image)
        })
        .collect())
}

/// Maps answer classes back to answer strings.
#[derive(Debug, Clone, Default)]
pub struct AnswerVocab {
    answers: HashMap<usize, String>,
}

impl AnswerVocab {
    /// Loads a json object of `"<class>": "<answer>"` entries.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let answers: HashMap<usize, String> = read_json(path)?;
        Ok(Self { answers })
    }

    pub fn answer(&self, class: usize) -> Option<&str> {
        self.answers.get(&class).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

impl FromIterator<(usize, String)> for AnswerVocab {
    fn from_iter<I: IntoIterator<Item = (usize, String)>>(iter: I) -> Self {
        Self {
            answers: iter.into_iter().collect(),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DataError> {
    let text = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })?;
    serde_json::from_str(&text).map_err(|source| DataError::Json {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn image_paths_resolve_against_the_table() {
        let dir = TempDir::new().unwrap();
        let table = dir.child(IMAGE_PATHS_NAME);
        std::fs::write(&table, r#"{"12": "features/12.npy", "7": "/abs/7.npy"}"#).unwrap();

        let paths = load_image_paths(&table).unwrap();
        assert_eq!(paths[&12], dir.path().join("features/12.npy"));
        assert_eq!(paths[&7], PathBuf::from("/abs/7.npy"));
    }

    #[test]
    fn answer_vocab_uses_string_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.child(ANSWER_VOCAB_NAME);
        std::fs::write(&path, r#"{"0": "yes", "1": "no", "2": "two"}"#).unwrap();

        let vocab = AnswerVocab::load(&path).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.answer(2), Some("two"));
        assert_eq!(vocab.answer(3), None);
    }

    #[test]
    fn malformed_json_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.child(TRAIN_SPLIT_NAME);
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(VqaSplit::load(&path), Err(DataError::Json { .. })));
    }

    #[test]
    fn answers_load_as_classes_or_one_hot_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.child(TRAIN_SPLIT_NAME);
        let split = r#"{
            "question_ids": [10, 11],
            "questions": [[1, 2], [3, 0]],
            "image_ids": [5, 6],
            "answers": ANSWERS
        }"#;

        std::fs::write(&path, split.replace("ANSWERS", "[2, 0]")).unwrap();
        let classes = VqaSplit::load(&path).unwrap();
        assert_eq!(classes.answers, vec![2, 0]);
        assert_eq!(classes.question_ids, vec![10, 11]);

        std::fs::write(&path, split.replace("ANSWERS", "[[0, 0, 1], [1.0, 0, 0]]")).unwrap();
        let one_hot = VqaSplit::load(&path).unwrap();
        assert_eq!(one_hot.answers, classes.answers);
        assert_eq!(one_hot.questions, classes.questions);

        std::fs::write(&path, split.replace("ANSWERS", "[[0, 0, 1], [0.5, 0.5, 0]]")).unwrap();
        assert!(matches!(
            VqaSplit::load(&path),
            Err(DataError::NotOneHot { index: 1 })
        ));
    }
}
