//! Batching: raw dataset items to normalized tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::augment::Augmenter;
use crate::dataset::{ImageItem, ImageShape, Normalization};

/// Standardizes image batches with per-channel statistics.
#[derive(Clone, Debug)]
pub struct Normalizer<B: Backend> {
    pub mean: Tensor<B, 4>,
    pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
    pub fn new(device: &Device<B>, stats: &Normalization) -> Self {
        let channels = stats.mean.len();
        let mean = Tensor::<B, 1>::from_floats(stats.mean.as_slice(), device)
            .reshape([1, channels, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(stats.std.as_slice(), device)
            .reshape([1, channels, 1, 1]);

        Self { mean, std }
    }

    /// Normalizes `[batch_size, channels, height, width]` input.
    pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (input - self.mean.clone()) / self.std.clone()
    }

    pub fn to_device(&self, device: &Device<B>) -> Self {
        Self {
            mean: self.mean.clone().to_device(device),
            std: self.std.clone().to_device(device),
        }
    }
}

#[derive(Clone)]
pub struct ClassificationBatcher<B: Backend> {
    normalizer: Normalizer<B>,
    shape: ImageShape,
    augmenter: Option<Augmenter>,
}

#[derive(Clone, Debug)]
pub struct ClassificationBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassificationBatcher<B> {
    pub fn new(device: B::Device, shape: ImageShape, stats: &Normalization) -> Self {
        Self {
            normalizer: Normalizer::new(&device, stats),
            shape,
            augmenter: None,
        }
    }

    /// Perturbs every image before normalization; meant for the training
    /// split only.
    pub fn with_augmenter(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }
}

impl<B: Backend> Batcher<B, ImageItem, ClassificationBatch<B>> for ClassificationBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ClassificationBatch<B> {
        let ImageShape {
            rows,
            cols,
            channels,
        } = self.shape;
        let mut rng = rand::rng();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    TensorData::from([(item.label as i64).elem::<B::IntElem>()]),
                    device,
                )
            })
            .collect();

        let images = items
            .into_iter()
            .map(|item| TensorData::new(item.image, Shape::new([channels, rows, cols])))
            .map(|data| Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device))
            .map(|tensor| {
                // Scale to [0, 1], perturb if training, then standardize.
                let tensor = tensor / 255;
                match &self.augmenter {
                    Some(augmenter) => augmenter.apply(tensor, &mut rng),
                    None => tensor,
                }
            })
            .collect();

        let images = Tensor::stack(images, 0);
        let targets = Tensor::cat(targets, 0);

        let images = self.normalizer.to_device(device).normalize(images);

        ClassificationBatch { images, targets }
    }
}
