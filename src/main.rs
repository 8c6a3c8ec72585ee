use std::path::PathBuf;

use burn::config::Config;
use burn::data::dataset::Dataset;
use burn::tensor::backend::AutodiffBackend;
use clap::{Parser, Subcommand};

use cifar_classification::config::ExperimentConfig;
use cifar_classification::{inference, training};

#[derive(Parser, Debug)]
#[command(version, about = "CIFAR image classification experiments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Fit the classifier and export artifacts (history CSV, best
    /// checkpoint, final model).
    Train {
        /// Experiment file overriding the built-in defaults.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Artifact directory overriding the configured one.
        #[arg(long, value_name = "DIR")]
        artifacts: Option<PathBuf>,
    },
    /// Classify one test-split image with a previously trained model.
    Infer {
        /// Artifact directory of the training run.
        #[arg(long, value_name = "DIR")]
        artifacts: Option<PathBuf>,
        /// Index into the test split.
        #[arg(long, default_value_t = 0)]
        index: usize,
    },
}

/// Resolves the training experiment: the given file or the built-in
/// defaults, with the artifact directory override applied on top.
fn resolve_train_config(config: Option<PathBuf>, artifacts: Option<PathBuf>) -> ExperimentConfig {
    let mut config = match config {
        Some(path) => {
            ExperimentConfig::load(&path).expect("Experiment config should be valid JSON")
        }
        None => ExperimentConfig::new(),
    };
    if let Some(dir) = artifacts {
        config.train.artifacts_path = dir.display().to_string();
    }
    config
}

fn launch<B: AutodiffBackend>(command: Commands, device: B::Device) {
    match command {
        Commands::Train { config, artifacts } => {
            let config = resolve_train_config(config, artifacts);
            training::run::<B>(&config, device);
        }
        Commands::Infer { artifacts, index } => {
            let artifact_dir = artifacts
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| ExperimentConfig::new().train.artifacts_path);
            let config = ExperimentConfig::load(format!("{artifact_dir}/config.json"))
                .expect("Config should exist in the artifact directory; run train first");

            let splits = config
                .dataset
                .source
                .module()
                .load()
                .expect("Dataset should be loaded");
            let item = splits
                .test
                .get(index)
                .expect("Index should be within the test split");

            inference::infer::<B::InnerBackend>(&artifact_dir, device, item, &splits.class_names);
        }
    }
}

#[cfg(any(
    feature = "ndarray",
    feature = "ndarray-blas-netlib",
    feature = "ndarray-blas-openblas"
))]
mod ndarray {
    use burn::backend::Autodiff;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    pub fn run(command: crate::Commands) {
        crate::launch::<Autodiff<NdArray>>(command, NdArrayDevice::Cpu);
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::Autodiff;
    use burn::backend::libtorch::{LibTorch, LibTorchDevice};

    pub fn run(command: crate::Commands) {
        crate::launch::<Autodiff<LibTorch>>(command, LibTorchDevice::Cpu);
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::Autodiff;
    use burn::backend::libtorch::{LibTorch, LibTorchDevice};

    pub fn run(command: crate::Commands) {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        crate::launch::<Autodiff<LibTorch>>(command, device);
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::Autodiff;
    use burn::backend::wgpu::{Wgpu, WgpuDevice};

    pub fn run(command: crate::Commands) {
        crate::launch::<Autodiff<Wgpu>>(command, WgpuDevice::default());
    }
}

#[cfg(feature = "cuda")]
mod cuda {
    use burn::backend::{Autodiff, Cuda};

    pub fn run(command: crate::Commands) {
        crate::launch::<Autodiff<Cuda>>(command, Default::default());
    }
}

fn main() {
    let cli = Cli::parse();

    #[cfg(any(
        feature = "ndarray",
        feature = "ndarray-blas-netlib",
        feature = "ndarray-blas-openblas"
    ))]
    ndarray::run(cli.command.clone());
    #[cfg(feature = "tch-cpu")]
    tch_cpu::run(cli.command.clone());
    #[cfg(feature = "tch-gpu")]
    tch_gpu::run(cli.command.clone());
    #[cfg(feature = "wgpu")]
    wgpu::run(cli.command.clone());
    #[cfg(feature = "cuda")]
    cuda::run(cli.command.clone());
}
