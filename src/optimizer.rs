//! Optimizer selection.
//!
//! The experiment file names one algorithm and its hyperparameters; the
//! driver maps the choice onto the corresponding Burn optimizer. Each
//! algorithm instantiates a distinct optimizer type, so the mapping hands
//! back configurations rather than boxed instances.

use burn::config::Config;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, SgdConfig};
use serde::{Deserialize, Serialize};

#[derive(Config, Debug)]
pub struct OptimizerConfig {
    #[config(default = "OptimizerKind::default()")]
    pub algorithm: OptimizerKind,
    /// Learning rate handed to the learner.
    #[config(default = 1e-4)]
    pub initial_lr: f64,
}

/// Supported algorithms, tagged by name in experiment files:
/// `{"sgd": {"momentum": 0.9}}` or `{"adam": {...}}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd {
        momentum: f64,
    },
    Adam {
        beta_1: f32,
        beta_2: f32,
        epsilon: f32,
    },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::Adam {
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sgd { .. } => "sgd",
            Self::Adam { .. } => "adam",
        }
    }
}

pub fn sgd_config(momentum: f64) -> SgdConfig {
    SgdConfig::new().with_momentum(Some(MomentumConfig::new().with_momentum(momentum)))
}

pub fn adam_config(beta_1: f32, beta_2: f32, epsilon: f32) -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(beta_1)
        .with_beta_2(beta_2)
        .with_epsilon(epsilon)
}
