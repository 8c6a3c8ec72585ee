//! Experiment configuration.
//!
//! One JSON file describes a full run: training settings, the dataset to
//! load, the optimizer and the model. Without a file, the defaults
//! describe the baseline CIFAR-10 experiment. The per-dataset overrides
//! are the only optional keys.

use burn::config::Config;

use crate::dataset::{DataModule, DatasetSource, ImageShape};
use crate::model::MlpConfig;
use crate::optimizer::OptimizerConfig;

#[derive(Config, Debug)]
pub struct ExperimentConfig {
    #[config(default = "TrainConfig::new()")]
    pub train: TrainConfig,
    #[config(default = "DatasetConfig::new()")]
    pub dataset: DatasetConfig,
    #[config(default = "OptimizerConfig::new()")]
    pub optimizer: OptimizerConfig,
    #[config(default = "MlpConfig::new()")]
    pub model: MlpConfig,
}

/// Settings of the training loop and its exported artifacts.
#[derive(Config, Debug)]
pub struct TrainConfig {
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 10)]
    pub num_epochs: usize,
    /// Perturb training images with random flips and shifts.
    #[config(default = true)]
    pub data_augmentation: bool,
    /// Directory every artifact of the run is written under.
    #[config(default = "String::from(\"/tmp/cifar-classification\")")]
    pub artifacts_path: String,
    /// File the best-validation-accuracy checkpoint is copied to.
    #[config(default = "String::from(\"best-checkpoint.mpk\")")]
    pub checkpoint_fname: String,
    /// Per-epoch metrics CSV.
    #[config(default = "String::from(\"history.csv\")")]
    pub history_fname: String,
    /// File stem of the final trained model.
    #[config(default = "String::from(\"model\")")]
    pub model_output_fname: String,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
}

/// Dataset selection plus optional overrides of the module defaults.
#[derive(Config, Debug)]
pub struct DatasetConfig {
    #[config(default = "DatasetSource::Cifar10")]
    pub source: DatasetSource,
    pub nb_classes: Option<usize>,
    pub img_rows: Option<usize>,
    pub img_cols: Option<usize>,
    pub img_channels: Option<usize>,
}

/// Dataset geometry after applying config overrides to the module
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDataset {
    pub n_classes: usize,
    pub shape: ImageShape,
}

impl DatasetConfig {
    /// Explicit config values win; anything unset falls back to what the
    /// dataset module reports.
    pub fn resolve(&self, module: &dyn DataModule) -> ResolvedDataset {
        let shape = module.image_shape();

        ResolvedDataset {
            n_classes: self.nb_classes.unwrap_or_else(|| module.n_classes()),
            shape: ImageShape {
                rows: self.img_rows.unwrap_or(shape.rows),
                cols: self.img_cols.unwrap_or(shape.cols),
                channels: self.img_channels.unwrap_or(shape.channels),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Cifar100;
    use crate::optimizer::OptimizerKind;

    #[test]
    fn defaults_describe_the_baseline_run() {
        let config = ExperimentConfig::new();

        assert_eq!(config.train.batch_size, 64);
        assert_eq!(config.train.num_epochs, 10);
        assert!(config.train.data_augmentation);
        assert_eq!(config.train.artifacts_path, "/tmp/cifar-classification");
        assert_eq!(config.train.history_fname, "history.csv");
        assert_eq!(config.train.seed, 42);
        assert_eq!(config.dataset.source, DatasetSource::Cifar10);
        assert_eq!(config.dataset.nb_classes, None);
        assert!(matches!(config.optimizer.algorithm, OptimizerKind::Adam { .. }));
    }

    #[test]
    fn resolve_prefers_config_overrides() {
        let config = DatasetConfig::new()
            .with_nb_classes(Some(20))
            .with_img_rows(Some(16));

        let resolved = config.resolve(&Cifar100);

        assert_eq!(resolved.n_classes, 20);
        assert_eq!(resolved.shape.rows, 16);
        assert_eq!(resolved.shape.cols, 32);
        assert_eq!(resolved.shape.channels, 3);
    }

    #[test]
    fn resolve_falls_back_to_module_defaults() {
        let resolved = DatasetConfig::new().resolve(&Cifar100);

        assert_eq!(resolved.n_classes, 100);
        assert_eq!(
            resolved.shape,
            ImageShape {
                rows: 32,
                cols: 32,
                channels: 3
            }
        );
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = ExperimentConfig::new()
            .with_dataset(DatasetConfig::new().with_source(DatasetSource::Cifar100))
            .with_optimizer(
                crate::optimizer::OptimizerConfig::new()
                    .with_algorithm(OptimizerKind::Sgd { momentum: 0.9 }),
            );
        config.save(&path).unwrap();

        let loaded = ExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded.dataset.source, DatasetSource::Cifar100);
        assert_eq!(
            loaded.optimizer.algorithm,
            OptimizerKind::Sgd { momentum: 0.9 }
        );
        assert_eq!(loaded.train.batch_size, config.train.batch_size);
        assert_eq!(loaded.train.artifacts_path, config.train.artifacts_path);
    }

    #[test]
    fn dataset_overrides_may_be_omitted() {
        let config: DatasetConfig = serde_json::from_str(r#"{"source": "cifar100"}"#).unwrap();

        assert_eq!(config.source, DatasetSource::Cifar100);
        assert_eq!(config.nb_classes, None);
        assert_eq!(config.img_rows, None);
        assert_eq!(config.img_cols, None);
        assert_eq!(config.img_channels, None);
    }

    #[test]
    fn shipped_experiment_files_load() {
        let configs = concat!(env!("CARGO_MANIFEST_DIR"), "/configs");

        let cifar10 = ExperimentConfig::load(format!("{configs}/cifar10_mlp.json")).unwrap();
        assert_eq!(cifar10.dataset.source, DatasetSource::Cifar10);
        assert_eq!(cifar10.train.num_epochs, 10);
        assert!(matches!(
            cifar10.optimizer.algorithm,
            OptimizerKind::Adam { .. }
        ));

        let cifar100 = ExperimentConfig::load(format!("{configs}/cifar100_sgd.json")).unwrap();
        assert_eq!(cifar100.dataset.source, DatasetSource::Cifar100);
        assert_eq!(cifar100.train.num_epochs, 40);
        assert!(matches!(
            cifar100.optimizer.algorithm,
            OptimizerKind::Sgd { momentum } if (momentum - 0.9).abs() < 1e-9
        ));
    }
}
