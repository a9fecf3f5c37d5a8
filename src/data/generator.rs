use crate::data::batcher::{VqaBatch, VqaBatcher, VqaItem};
use crate::data::features::{FeatureShape, grid_to_regions, load_feature_map};
use crate::error::DataError;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Immutable sample arrays shared between the generator and its data loader workers.
#[derive(Debug)]
pub struct SampleTable {
    /// # Shape
    /// [num_items, seq_length]
    pub questions: Vec<Vec<u32>>,
    pub image_ids: Vec<u64>,
    pub image_paths: HashMap<u64, PathBuf>,
    pub answers: Vec<usize>,
    pub feature_shape: FeatureShape,
}

impl SampleTable {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Loads one sample, reading its feature map from disk.
    pub fn load_item(&self, index: usize) -> Result<VqaItem, DataError> {
        let image_id = self.image_ids[index];
        let path = self
            .image_paths
            .get(&image_id)
            .ok_or(DataError::MissingImagePath { image_id, index })?;
        let grid = load_feature_map(path, self.feature_shape)?;
        let regions = grid_to_regions(grid.view())?;
        debug_assert_eq!(
            (self.feature_shape.regions(), self.feature_shape.channels),
            regions.dim()
        );
        Ok(VqaItem {
            index,
            question: self.questions[index].clone(),
            regions: regions.iter().copied().collect(),
            answer: self.answers[index],
        })
    }

    /// Loads every sample of a batch; the first failure aborts the batch.
    pub fn load_items(&self, indexes: &[usize]) -> Result<Vec<VqaItem>, DataError> {
        indexes.iter().map(|&index| self.load_item(index)).collect()
    }
}

/// The samples of one epoch, in the epoch's order.
#[derive(Debug, Clone)]
pub struct EpochDataset {
    table: Arc<SampleTable>,
    indexes: Arc<Vec<usize>>,
}

impl Dataset<Result<VqaItem, DataError>> for EpochDataset {
    fn get(&self, position: usize) -> Option<Result<VqaItem, DataError>> {
        let &index = self.indexes.get(position)?;
        Some(self.table.load_item(index))
    }

    fn len(&self) -> usize {
        self.indexes.len()
    }
}

/// Batches of an epoch, loaded by burn's data loader.
pub type VqaDataLoader<B> = Arc<dyn DataLoader<B, Result<VqaBatch<B>, DataError>>>;

/// Produces shuffled mini-batches of (question, image regions, answer) triples.
///
/// Image features are read from disk each time a batch is requested; nothing is cached
/// across epochs. The batch order of an epoch is a permutation of all sample indexes,
/// cut into `batch_size` chunks (the last one may be smaller).
#[derive(Debug)]
pub struct DataGenerator {
    table: Arc<SampleTable>,
    batch_size: usize,
    shuffle: bool,
    num_classes: usize,
    seq_length: usize,
    rng: StdRng,
    epoch: usize,
    /// # Shape
    /// [num_items]
    indexes: Arc<Vec<usize>>,
}

/// Everything needed to build a [`DataGenerator`].
#[derive(Debug, Clone)]
pub struct DataGeneratorConfig {
    pub seq_length: usize,
    pub vocab_size: usize,
    pub num_classes: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
    pub feature_shape: FeatureShape,
}

impl DataGenerator {
    /// Validates the parallel arrays and prepares the first epoch.
    pub fn new(
        questions: Vec<Vec<u32>>,
        image_ids: Vec<u64>,
        image_paths: HashMap<u64, PathBuf>,
        answers: Vec<usize>,
        config: &DataGeneratorConfig,
    ) -> Result<Self, DataError> {
        if config.batch_size == 0 {
            return Err(DataError::ZeroBatchSize);
        }
        let num_items = questions.len();
        for (name, found) in [("image_ids", image_ids.len()), ("answers", answers.len())] {
            if found != num_items {
                return Err(DataError::LengthMismatch {
                    name,
                    found,
                    expected: num_items,
                });
            }
        }
        for (index, question) in questions.iter().enumerate() {
            if question.len() != config.seq_length {
                return Err(DataError::QuestionLength {
                    index,
                    found: question.len(),
                    expected: config.seq_length,
                });
            }
            if let Some(&token) = question
                .iter()
                .find(|&&token| token as usize >= config.vocab_size)
            {
                return Err(DataError::TokenOutOfRange {
                    index,
                    token,
                    vocab_size: config.vocab_size,
                });
            }
        }
        for (index, &image_id) in image_ids.iter().enumerate() {
            if !image_paths.contains_key(&image_id) {
                return Err(DataError::MissingImagePath { image_id, index });
            }
        }
        for (index, &answer) in answers.iter().enumerate() {
            if answer >= config.num_classes {
                return Err(DataError::AnswerOutOfRange {
                    index,
                    answer,
                    num_classes: config.num_classes,
                });
            }
        }

        let table = SampleTable {
            questions,
            image_ids,
            image_paths,
            answers,
            feature_shape: config.feature_shape,
        };
        let mut generator = Self {
            table: Arc::new(table),
            batch_size: config.batch_size,
            shuffle: config.shuffle,
            num_classes: config.num_classes,
            seq_length: config.seq_length,
            rng: StdRng::seed_from_u64(config.seed),
            epoch: 0,
            indexes: Arc::new(Vec::new()),
        };
        generator.reset_indexes();
        Ok(generator)
    }

    /// Number of batches per epoch, `ceil(num_items / batch_size)`.
    pub fn len(&self) -> usize {
        self.table.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    pub fn num_items(&self) -> usize {
        self.table.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// The sample order of the current epoch.
    pub fn indexes(&self) -> &[usize] {
        &self.indexes
    }

    pub fn table(&self) -> &Arc<SampleTable> {
        &self.table
    }

    pub fn batcher(&self) -> VqaBatcher {
        VqaBatcher {
            seq_length: self.seq_length,
            regions: self.table.feature_shape.regions(),
            channels: self.table.feature_shape.channels,
            num_classes: self.num_classes,
        }
    }

    /// Sample indexes of batch `index`.
    pub fn batch_indexes(&self, index: usize) -> Result<&[usize], DataError> {
        let len = self.len();
        if index >= len {
            return Err(DataError::BatchOutOfRange { index, len });
        }
        let (start, end) = batch_bounds(index, self.batch_size, self.num_items());
        Ok(&self.indexes[start..end])
    }

    /// Loads the samples of batch `index`.
    pub fn items(&self, index: usize) -> Result<Vec<VqaItem>, DataError> {
        let indexes = self.batch_indexes(index)?;
        let items = self.table.load_items(indexes)?;
        tracing::debug!("get {}/{} batches of data", index + 1, self.len());
        Ok(items)
    }

    /// Loads batch `index` as tensors.
    pub fn batch<B: Backend>(
        &self,
        index: usize,
        device: &B::Device,
    ) -> Result<VqaBatch<B>, DataError> {
        let items = self.items(index)?;
        Ok(self.batcher().stack(items, device))
    }

    /// Iterates over all batches of the current epoch, in order, on the calling thread.
    pub fn iter<'a, B: Backend>(
        &'a self,
        device: &'a B::Device,
    ) -> impl Iterator<Item = Result<VqaBatch<B>, DataError>> + 'a {
        (0..self.len()).map(move |index| self.batch(index, device))
    }

    /// The samples of the current epoch, in order.
    pub fn dataset(&self) -> EpochDataset {
        EpochDataset {
            table: Arc::clone(&self.table),
            indexes: Arc::clone(&self.indexes),
        }
    }

    /// A data loader over the current epoch, loading feature maps on `num_workers` threads.
    ///
    /// With worker threads, the epoch is split between the workers, so batches are neither
    /// delivered nor composed in the order of [`Self::batch_indexes`]; every sample is
    /// still delivered exactly once. `num_workers = 0` loads on the consuming thread, in
    /// order.
    pub fn loader<B: Backend>(&self, num_workers: usize, device: &B::Device) -> VqaDataLoader<B> {
        let builder = DataLoaderBuilder::new(self.batcher())
            .batch_size(self.batch_size)
            .set_device(device.clone());
        let builder = if num_workers > 0 {
            builder.num_workers(num_workers)
        } else {
            builder
        };
        builder.build(self.dataset())
    }

    /// Prepares the next epoch, re-shuffling the sample order when enabled.
    pub fn on_epoch_end(&mut self) {
        self.epoch += 1;
        self.reset_indexes();
        tracing::info!("end of epoch {}, shuffled: {}", self.epoch, self.shuffle);
    }

    fn reset_indexes(&mut self) {
        let mut indexes: Vec<usize> = (0..self.num_items()).collect();
        if self.shuffle {
            indexes.shuffle(&mut self.rng);
        }
        self.indexes = Arc::new(indexes);
    }
}

/// Bounds `[start, end)` of batch `index` within `num_items` items.
pub fn batch_bounds(index: usize, batch_size: usize, num_items: usize) -> (usize, usize) {
    let start = index * batch_size;
    let end = ((index + 1) * batch_size).min(num_items);
    (start, end)
}

/// Converts one-hot answer rows into class indexes.
pub fn from_one_hot(rows: &[Vec<f32>]) -> Result<Vec<usize>, DataError> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let mut hot = row.iter().enumerate().filter(|(_, v)| **v != 0.);
            match (hot.next(), hot.next()) {
                (Some((class, v)), None) if *v == 1. => Ok(class),
                _ => Err(DataError::NotOneHot { index }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use ndarray_npy::WriteNpyExt;
    use std::fs::File;
    use temp_dir::TempDir;

    fn write_features(
        dir: &TempDir,
        n_images: u64,
        shape: FeatureShape,
    ) -> HashMap<u64, PathBuf> {
        (0..n_images)
            .map(|id| {
                let path = dir.child(format!("{id}.npy"));
                let grid = Array3::<f32>::from_elem(shape.dims(), id as f32);
                grid.write_npy(File::create(&path).unwrap()).unwrap();
                (id, path)
            })
            .collect()
    }

    fn config(batch_size: usize, shuffle: bool) -> DataGeneratorConfig {
        DataGeneratorConfig {
            seq_length: 2,
            vocab_size: 10,
            num_classes: 3,
            batch_size,
            shuffle,
            seed: 0,
            feature_shape: FeatureShape::new(2, 2, 2),
        }
    }

    fn generator(dir: &TempDir, n: usize, batch_size: usize, shuffle: bool) -> DataGenerator {
        let cfg = config(batch_size, shuffle);
        let paths = write_features(dir, n as u64, cfg.feature_shape);
        DataGenerator::new(
            (0..n).map(|i| vec![i as u32 % 10, 1]).collect(),
            (0..n as u64).collect(),
            paths,
            (0..n).map(|i| i % 3).collect(),
            &cfg,
        )
        .unwrap()
    }

    #[test]
    fn five_samples_in_batches_of_two() {
        let dir = TempDir::new().unwrap();
        let mut generator = generator(&dir, 5, 2, true);
        assert_eq!(generator.len(), 3);

        for _epoch in 0..3 {
            let sizes: Vec<usize> = (0..generator.len())
                .map(|b| generator.batch_indexes(b).unwrap().len())
                .collect();
            assert_eq!(sizes, vec![2, 2, 1]);

            let mut seen: Vec<usize> = (0..generator.len())
                .flat_map(|b| generator.batch_indexes(b).unwrap().to_vec())
                .collect();
            seen.sort();
            assert_eq!(seen, vec![0, 1, 2, 3, 4]);

            generator.on_epoch_end();
        }
        assert_eq!(generator.epoch(), 3);
        assert!(generator.batch_indexes(3).is_err());
    }

    #[test]
    fn permutation_is_a_bijection_every_epoch() {
        let dir = TempDir::new().unwrap();
        let mut generator = generator(&dir, 23, 4, true);
        let mut orders = Vec::new();
        for _ in 0..4 {
            let mut sorted = generator.indexes().to_vec();
            orders.push(sorted.clone());
            sorted.sort();
            assert_eq!(sorted, (0..23).collect::<Vec<_>>());

            let total: usize = (0..generator.len())
                .map(|b| generator.batch_indexes(b).unwrap().len())
                .sum();
            assert_eq!(total, 23);
            generator.on_epoch_end();
        }
        // reshuffled at each epoch boundary
        assert!(orders.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn unshuffled_order_is_sequential() {
        let dir = TempDir::new().unwrap();
        let mut generator = generator(&dir, 5, 2, false);
        generator.on_epoch_end();
        assert_eq!(generator.indexes(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn loads_channel_last_regions() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, 3, 2, false);
        let items = generator.items(1).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].index, 2);
        assert_eq!(items[0].regions, vec![2.; 8]);
        assert_eq!(items[0].answer, 2);
    }

    #[test]
    fn missing_feature_file_aborts_the_batch() {
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, 4, 2, false);
        std::fs::remove_file(dir.child("3.npy")).unwrap();
        assert!(generator.items(0).is_ok());
        assert!(matches!(generator.items(1), Err(DataError::Io { .. })));
    }

    #[test]
    fn rejects_inconsistent_inputs() {
        let dir = TempDir::new().unwrap();
        let cfg = config(2, false);
        let paths = write_features(&dir, 2, cfg.feature_shape);

        let err = DataGenerator::new(
            vec![vec![1, 2], vec![1, 2]],
            vec![0, 7],
            paths.clone(),
            vec![0, 1],
            &cfg,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataError::MissingImagePath {
                image_id: 7,
                index: 1
            }
        ));

        let err =
            DataGenerator::new(vec![vec![1, 2]], vec![0, 1], paths.clone(), vec![0], &cfg)
                .unwrap_err();
        assert!(matches!(err, DataError::LengthMismatch { .. }));

        let err = DataGenerator::new(vec![vec![1, 12]], vec![0], paths.clone(), vec![0], &cfg)
            .unwrap_err();
        assert!(matches!(err, DataError::TokenOutOfRange { token: 12, .. }));

        let err = DataGenerator::new(vec![vec![1, 2]], vec![0], paths, vec![3], &cfg)
            .unwrap_err();
        assert!(matches!(err, DataError::AnswerOutOfRange { .. }));
    }

    #[test]
    fn one_hot_rows_become_classes() {
        let classes = from_one_hot(&[vec![0., 1., 0.], vec![1., 0., 0.]]).unwrap();
        assert_eq!(classes, vec![1, 0]);
        assert!(from_one_hot(&[vec![0., 1., 1.]]).is_err());
        assert!(from_one_hot(&[vec![0., 0., 0.]]).is_err());
    }

    #[test]
    fn loader_delivers_every_sample_once() {
        type TestBackend = burn::backend::NdArray<f32>;
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let mut generator = generator(&dir, 17, 3, true);
        for num_workers in [0, 1, 4] {
            let loader = generator.loader::<TestBackend>(num_workers, &device);
            let batches: Vec<VqaBatch<TestBackend>> =
                loader.iter().collect::<Result<_, _>>().unwrap();

            let mut seen: Vec<usize> = batches.iter().flat_map(|b| b.indexes.clone()).collect();
            if num_workers == 0 {
                assert_eq!(seen, generator.indexes());
                let sizes: Vec<usize> = batches.iter().map(VqaBatch::len).collect();
                assert_eq!(sizes, vec![3, 3, 3, 3, 3, 2]);
            }
            seen.sort();
            assert_eq!(seen, (0..17).collect::<Vec<_>>());
            generator.on_epoch_end();
        }
    }

    #[test]
    fn loader_reports_a_missing_feature_file() {
        type TestBackend = burn::backend::NdArray<f32>;
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let generator = generator(&dir, 8, 2, false);
        std::fs::remove_file(dir.child("5.npy")).unwrap();
        for num_workers in [0, 3] {
            let loader = generator.loader::<TestBackend>(num_workers, &device);
            let results: Vec<_> = loader.iter().collect();
            let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], DataError::Io { .. }));
        }
    }
}
