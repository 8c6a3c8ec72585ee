//! The training driver: wires config, data, model and optimizer into a
//! learner run, then exports the run's artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use burn::config::Config;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::train::LearnerBuilder;
use burn::train::checkpoint::{
    ComposedCheckpointingStrategy, KeepLastNCheckpoints, MetricCheckpointingStrategy,
};
use burn::train::metric::store::{Aggregate, Direction, Split};
use burn::train::metric::{AccuracyMetric, LossMetric};

use crate::augment::Augmenter;
use crate::config::ExperimentConfig;
use crate::data::{ClassificationBatch, ClassificationBatcher};
use crate::history::{self, EpochRecord};
use crate::model::Mlp;
use crate::optimizer::{OptimizerKind, adam_config, sgd_config};

/// Subdirectory the learner writes per-epoch checkpoints under.
const CHECKPOINT_DIR: &str = "checkpoint";

/// Runs the full experiment described by `config`: load the dataset, fit
/// the model, then write the history CSV, the best checkpoint and the
/// final model into the artifact directory.
pub fn run<B: AutodiffBackend>(config: &ExperimentConfig, device: B::Device) {
    let artifact_dir = config.train.artifacts_path.as_str();
    fs::create_dir_all(artifact_dir).ok();
    config
        .save(format!("{artifact_dir}/config.json"))
        .expect("Config should be saved successfully");

    B::seed(config.train.seed);

    let module = config.dataset.source.module();
    let resolved = config.dataset.resolve(module.as_ref());
    let stats = module.normalization();
    let splits = module.load().expect("Dataset should be loaded");
    println!(
        "Data loaded: {} classes, images {}x{}x{}.",
        resolved.n_classes, resolved.shape.channels, resolved.shape.rows, resolved.shape.cols
    );

    // Dataloaders; the test split serves as validation data.
    let mut batcher_train =
        ClassificationBatcher::<B>::new(device.clone(), resolved.shape, &stats);
    if config.train.data_augmentation {
        println!("Using real-time data augmentation.");
        batcher_train = batcher_train.with_augmenter(Augmenter::new());
    } else {
        println!("Not using data augmentation.");
    }
    let batcher_valid =
        ClassificationBatcher::<B::InnerBackend>::new(device.clone(), resolved.shape, &stats);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.train.batch_size)
        .shuffle(config.train.seed)
        .num_workers(config.train.num_workers)
        .build(splits.train);

    let dataloader_test = DataLoaderBuilder::new(batcher_valid)
        .batch_size(config.train.batch_size)
        .num_workers(config.train.num_workers)
        .build(splits.test);

    let model = config
        .model
        .init::<B>(resolved.n_classes, resolved.shape, &device);
    println!("Model created.");
    let lr = config.optimizer.initial_lr;
    println!(
        "Optimizer: {} (initial lr {}).",
        config.optimizer.algorithm.name(),
        lr
    );

    let model_trained = match config.optimizer.algorithm {
        OptimizerKind::Sgd { momentum } => fit(
            config,
            device,
            model,
            sgd_config(momentum).init(),
            lr,
            dataloader_train,
            dataloader_test,
        ),
        OptimizerKind::Adam {
            beta_1,
            beta_2,
            epsilon,
        } => fit(
            config,
            device,
            model,
            adam_config(beta_1, beta_2, epsilon).init(),
            lr,
            dataloader_train,
            dataloader_test,
        ),
    };

    export(config, model_trained);
}

/// Builds the learner and fits the model. Checkpoints every epoch, keeping
/// the last two plus the epoch with the best validation accuracy.
fn fit<B, O>(
    config: &ExperimentConfig,
    device: B::Device,
    model: Mlp<B>,
    optim: O,
    lr: f64,
    dataloader_train: Arc<dyn DataLoader<B, ClassificationBatch<B>>>,
    dataloader_valid: Arc<dyn DataLoader<B::InnerBackend, ClassificationBatch<B::InnerBackend>>>,
) -> Mlp<B>
where
    B: AutodiffBackend,
    O: Optimizer<Mlp<B>, B>,
    O::Record: 'static,
{
    let learner = LearnerBuilder::new(config.train.artifacts_path.as_str())
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .with_checkpointing_strategy(
            ComposedCheckpointingStrategy::builder()
                .add(KeepLastNCheckpoints::new(2))
                .add(MetricCheckpointingStrategy::new(
                    &AccuracyMetric::<B::InnerBackend>::new(),
                    Aggregate::Mean,
                    Direction::Highest,
                    Split::Valid,
                ))
                .build(),
        )
        .devices(vec![device])
        .num_epochs(config.train.num_epochs)
        .summary()
        .build(model, optim, lr);

    let now = Instant::now();
    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    let elapsed = now.elapsed().as_secs();
    println!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);

    model_trained
}

/// Writes the post-run artifacts: history CSV, promoted best checkpoint
/// and the final trained model.
fn export<B: AutodiffBackend>(config: &ExperimentConfig, model: Mlp<B>) {
    let artifact_dir = config.train.artifacts_path.as_str();

    let records = history::collect(artifact_dir, config.train.num_epochs)
        .expect("Training history should be readable");
    let history_path = Path::new(artifact_dir).join(&config.train.history_fname);
    history::write_csv(&history_path, &records).expect("History CSV should be written");

    promote_best_checkpoint(artifact_dir, &config.train.checkpoint_fname, &records)
        .expect("Best checkpoint should be promoted");

    let model_path = Path::new(artifact_dir).join(&config.train.model_output_fname);
    model
        .save_file(model_path, &CompactRecorder::new())
        .expect("Trained model should be saved successfully");
}

/// Copies the kept checkpoint with the best validation accuracy to the
/// configured file. The checkpointing strategy prunes most epochs, so only
/// checkpoints still on disk are considered.
fn promote_best_checkpoint(
    artifact_dir: &str,
    checkpoint_fname: &str,
    records: &[EpochRecord],
) -> std::io::Result<()> {
    let checkpoint_dir = Path::new(artifact_dir).join(CHECKPOINT_DIR);

    let mut best: Option<(f64, PathBuf)> = None;
    for (index, record) in records.iter().enumerate() {
        let path = checkpoint_dir.join(format!("model-{}.mpk", index + 1));
        if !path.is_file() {
            continue;
        }
        if best.as_ref().is_none_or(|(acc, _)| record.val_acc > *acc) {
            best = Some((record.val_acc, path));
        }
    }

    if let Some((_, source)) = best {
        fs::copy(source, Path::new(artifact_dir).join(checkpoint_fname))?;
    }

    Ok(())
}
