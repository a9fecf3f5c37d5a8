use crate::error::DataError;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

/// A single loaded sample.
#[derive(Debug, Clone)]
pub struct VqaItem {
    /// Position of the sample in the generator's arrays.
    pub index: usize,
    /// # Shape
    /// [seq_length]
    pub question: Vec<u32>,
    /// Region-major image features.
    ///
    /// # Shape
    /// [regions * channels]
    pub regions: Vec<f32>,
    /// Answer class.
    pub answer: usize,
}

#[derive(Clone, Debug)]
pub struct VqaBatch<B: Backend> {
    /// Sample positions, aligned with the batch rows.
    pub indexes: Vec<usize>,
    /// # Shape
    /// [batch_size, seq_length]
    pub questions: Tensor<B, 2, Int>,
    /// # Shape
    /// [batch_size, regions, channels]
    pub images: Tensor<B, 3>,
    /// One-hot answers.
    ///
    /// # Shape
    /// [batch_size, num_classes]
    pub answers: Tensor<B, 2>,
    /// Answer classes.
    ///
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> VqaBatch<B> {
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

/// Stacks loaded samples into tensors.
#[derive(Clone, Debug)]
pub struct VqaBatcher {
    pub seq_length: usize,
    pub regions: usize,
    pub channels: usize,
    pub num_classes: usize,
}

impl<B: Backend> Batcher<B, Result<VqaItem, DataError>, Result<VqaBatch<B>, DataError>>
    for VqaBatcher
{
    /// Stacks the loaded samples; the first failed sample fails the whole batch.
    fn batch(
        &self,
        items: Vec<Result<VqaItem, DataError>>,
        device: &B::Device,
    ) -> Result<VqaBatch<B>, DataError> {
        let items = items.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(self.stack(items, device))
    }
}

impl VqaBatcher {
    pub fn stack<B: Backend>(&self, items: Vec<VqaItem>, device: &B::Device) -> VqaBatch<B> {
        let batch_size = items.len();

        let mut indexes = Vec::with_capacity(batch_size);
        let mut questions = Vec::with_capacity(batch_size * self.seq_length);
        let mut images = Vec::with_capacity(batch_size * self.regions * self.channels);
        let mut targets = Vec::with_capacity(batch_size);
        let mut answers = vec![0f32; batch_size * self.num_classes];
        for (row, item) in items.into_iter().enumerate() {
            debug_assert_eq!(item.question.len(), self.seq_length);
            debug_assert_eq!(item.regions.len(), self.regions * self.channels);
            indexes.push(item.index);
            questions.extend(item.question.into_iter().map(i64::from));
            images.extend(item.regions);
            targets.push(item.answer as i64);
            answers[row * self.num_classes + item.answer] = 1.;
        }

        let questions = Tensor::<B, 2, Int>::from_data(
            TensorData::new(questions, [batch_size, self.seq_length]).convert::<B::IntElem>(),
            device,
        );
        let images = Tensor::<B, 3>::from_data(
            TensorData::new(images, [batch_size, self.regions, self.channels])
                .convert::<B::FloatElem>(),
            device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets, [batch_size]).convert::<B::IntElem>(),
            device,
        );
        let answers = Tensor::<B, 2>::from_data(
            TensorData::new(answers, [batch_size, self.num_classes]).convert::<B::FloatElem>(),
            device,
        );

        VqaBatch {
            indexes,
            questions,
            images,
            answers,
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn stacks_items_in_order() {
        let device = Default::default();
        let batcher = VqaBatcher {
            seq_length: 3,
            regions: 2,
            channels: 2,
            num_classes: 4,
        };
        let items = vec![
            VqaItem {
                index: 7,
                question: vec![1, 2, 3],
                regions: vec![0., 1., 2., 3.],
                answer: 2,
            },
            VqaItem {
                index: 1,
                question: vec![4, 5, 0],
                regions: vec![4., 5., 6., 7.],
                answer: 0,
            },
        ];
        let batch: VqaBatch<TestBackend> = batcher.stack(items, &device);

        assert_eq!(batch.indexes, vec![7, 1]);
        assert_eq!([2, 3], batch.questions.dims());
        assert_eq!([2, 2, 2], batch.images.dims());
        let images = batch.images.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(images, vec![0., 1., 2., 3., 4., 5., 6., 7.]);
        let answers = batch.answers.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(answers, vec![0., 0., 1., 0., 1., 0., 0., 0.]);
        let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![2, 0]);
    }

    #[test]
    fn a_failed_sample_fails_the_batch() {
        let device = Default::default();
        let batcher = VqaBatcher {
            seq_length: 1,
            regions: 1,
            channels: 1,
            num_classes: 2,
        };
        let items = vec![
            Ok(VqaItem {
                index: 0,
                question: vec![1],
                regions: vec![0.5],
                answer: 1,
            }),
            Err(DataError::MissingImagePath {
                image_id: 9,
                index: 1,
            }),
        ];
        let batch: Result<VqaBatch<TestBackend>, DataError> = batcher.batch(items, &device);
        assert!(matches!(
            batch,
            Err(DataError::MissingImagePath { image_id: 9, .. })
        ));
    }
}
