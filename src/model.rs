//! The baseline classifier: flatten the image, apply one fully-connected
//! layer. Softmax stays out of `forward` so the loss can work on logits;
//! `predict` applies it for inference.

use burn::config::Config;
use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::activation::softmax;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor};
use burn::train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep};

use crate::data::ClassificationBatch;
use crate::dataset::ImageShape;

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    linear: Linear<B>,
}

#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Standard deviation of the normal distribution weights start from.
    #[config(default = 0.02)]
    pub init_std: f64,
}

impl MlpConfig {
    /// Builds the model for `num_classes` outputs over images of the given
    /// shape.
    pub fn init<B: Backend>(
        &self,
        num_classes: usize,
        shape: ImageShape,
        device: &B::Device,
    ) -> Mlp<B> {
        let linear = LinearConfig::new(shape.num_elements(), num_classes)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: self.init_std,
            })
            .init(device);

        Mlp { linear }
    }
}

impl<B: Backend> Mlp<B> {
    /// Maps `[batch_size, channels, height, width]` images to one logit per
    /// class.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, channels, height, width] = images.dims();
        let x = images.reshape([batch_size, channels * height * width]);

        self.linear.forward(x)
    }

    /// Class probabilities for a batch of images.
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<ClassificationBatch<B>, ClassificationOutput<B>> for Mlp<B> {
    fn step(&self, batch: ClassificationBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<ClassificationBatch<B>, ClassificationOutput<B>> for Mlp<B> {
    fn step(&self, batch: ClassificationBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}
