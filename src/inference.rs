//! Single-image inference against the artifacts of a finished run.

use burn::config::Config;
use burn::data::dataloader::batcher::Batcher;
use burn::module::Module;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::ElementConversion;
use burn::tensor::backend::Backend;
use std::path::Path;

use crate::config::ExperimentConfig;
use crate::data::ClassificationBatcher;
use crate::dataset::ImageItem;

/// Reloads the trained model and classifies one image, printing the
/// predicted class with its probability next to the expected label.
pub fn infer<B: Backend>(
    artifact_dir: &str,
    device: B::Device,
    item: ImageItem,
    class_names: &[String],
) {
    let config = ExperimentConfig::load(format!("{artifact_dir}/config.json"))
        .expect("Config should exist for the model; run train first");
    let record = CompactRecorder::new()
        .load(
            Path::new(artifact_dir).join(&config.train.model_output_fname),
            &device,
        )
        .expect("Trained model should exist; run train first");

    let module = config.dataset.source.module();
    let resolved = config.dataset.resolve(module.as_ref());
    let model = config
        .model
        .init::<B>(resolved.n_classes, resolved.shape, &device)
        .load_record(record);

    let label = item.label as usize;
    let batcher =
        ClassificationBatcher::<B>::new(device.clone(), resolved.shape, &module.normalization());
    let batch = batcher.batch(vec![item], &device);

    let probabilities = model.predict(batch.images);
    let predicted = probabilities
        .clone()
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_scalar()
        .elem::<i64>() as usize;
    let confidence = probabilities
        .slice([0..1, predicted..predicted + 1])
        .into_scalar()
        .elem::<f64>();

    println!(
        "Predicted {} ({:.1}%) Expected {}",
        name_of(class_names, predicted),
        confidence * 100.0,
        name_of(class_names, label),
    );
}

fn name_of(class_names: &[String], index: usize) -> String {
    class_names
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("class_{index}"))
}
